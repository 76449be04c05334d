//! Storage contract for fiscal documents and the response log.
//!
//! Every component except the transition validator treats documents as
//! read-only; the version-guarded `update_document` is the primitive the
//! validator builds its optimistic-concurrency contract on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{FiscalDocument, ResponseLogEntry};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &FiscalDocument) -> Result<(), StoreError>;

    async fn document(&self, id: Uuid) -> Result<Option<FiscalDocument>, StoreError>;

    async fn documents_for_invoice(
        &self,
        source_invoice_ref: &str,
    ) -> Result<Vec<FiscalDocument>, StoreError>;

    async fn document_by_authority_uuid(
        &self,
        authority_uuid: &str,
    ) -> Result<Option<FiscalDocument>, StoreError>;

    /// Persist `doc` only if the stored version still equals
    /// `expected_version`; `StoreError::Conflict` otherwise.
    async fn update_document(
        &self,
        doc: &FiscalDocument,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Documents whose last authority call never resolved (PROCESSING or
    /// CANCEL_PENDING with an outstanding sync). Input of the reconciliation
    /// sweep.
    async fn documents_with_pending_sync(&self) -> Result<Vec<FiscalDocument>, StoreError>;

    async fn append_log(&self, entry: &ResponseLogEntry) -> Result<(), StoreError>;

    async fn log_for_document(&self, id: Uuid) -> Result<Vec<ResponseLogEntry>, StoreError>;
}
