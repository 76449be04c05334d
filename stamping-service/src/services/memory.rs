//! In-memory document store, used by the test suite and local development.
//!
//! Mirrors the Postgres store's semantics, including the partial uniqueness
//! rule on active documents, so invariant tests exercise the same behavior
//! the database enforces.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{DocumentStatus, FiscalDocument, ResponseLogEntry, SyncStatus};
use crate::services::store::DocumentStore;

#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<HashMap<Uuid, FiscalDocument>>,
    log: Mutex<Vec<ResponseLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend(anyhow::anyhow!("store lock poisoned")))
}

/// The in-memory twin of the partial unique index: at most one STAMPED or
/// CANCEL_PENDING document per source invoice.
fn check_single_active(
    documents: &HashMap<Uuid, FiscalDocument>,
    candidate: &FiscalDocument,
) -> Result<(), StoreError> {
    if !candidate.is_active() {
        return Ok(());
    }
    let clash = documents.values().any(|existing| {
        existing.id != candidate.id
            && existing.source_invoice_ref == candidate.source_invoice_ref
            && existing.is_active()
    });
    if clash {
        return Err(StoreError::Conflict);
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &FiscalDocument) -> Result<(), StoreError> {
        let mut documents = lock(&self.documents)?;
        if documents.contains_key(&doc.id) {
            return Err(StoreError::Conflict);
        }
        check_single_active(&documents, doc)?;
        documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<FiscalDocument>, StoreError> {
        Ok(lock(&self.documents)?.get(&id).cloned())
    }

    async fn documents_for_invoice(
        &self,
        source_invoice_ref: &str,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        let documents = lock(&self.documents)?;
        let mut matches: Vec<FiscalDocument> = documents
            .values()
            .filter(|doc| doc.source_invoice_ref == source_invoice_ref)
            .cloned()
            .collect();
        matches.sort_by_key(|doc| doc.created_utc);
        Ok(matches)
    }

    async fn document_by_authority_uuid(
        &self,
        authority_uuid: &str,
    ) -> Result<Option<FiscalDocument>, StoreError> {
        let documents = lock(&self.documents)?;
        Ok(documents
            .values()
            .find(|doc| doc.authority_uuid.as_deref() == Some(authority_uuid))
            .cloned())
    }

    async fn update_document(
        &self,
        doc: &FiscalDocument,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut documents = lock(&self.documents)?;
        let current = documents.get(&doc.id).ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::Conflict);
        }
        check_single_active(&documents, doc)?;
        documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn documents_with_pending_sync(&self) -> Result<Vec<FiscalDocument>, StoreError> {
        let documents = lock(&self.documents)?;
        let mut matches: Vec<FiscalDocument> = documents
            .values()
            .filter(|doc| {
                doc.sync_status == SyncStatus::Pending
                    && matches!(
                        doc.status,
                        DocumentStatus::Processing | DocumentStatus::CancelPending
                    )
            })
            .cloned()
            .collect();
        matches.sort_by_key(|doc| doc.created_utc);
        Ok(matches)
    }

    async fn append_log(&self, entry: &ResponseLogEntry) -> Result<(), StoreError> {
        lock(&self.log)?.push(entry.clone());
        Ok(())
    }

    async fn log_for_document(&self, id: Uuid) -> Result<Vec<ResponseLogEntry>, StoreError> {
        let log = lock(&self.log)?;
        let mut entries: Vec<ResponseLogEntry> = log
            .iter()
            .filter(|entry| entry.fiscal_document_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.timestamp_utc);
        Ok(entries)
    }
}
