//! The operations the core exposes: create, stamp, cancel, inspect, archive.

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{CancelError, DocumentError, StampError};
use crate::models::{
    CancellationMotive, DocumentStatus, FiscalDocument, NewDocument, ResponseLogEntry,
};
use crate::services::cancellation::CancellationOrchestrator;
use crate::services::stamping::StampingOrchestrator;
use crate::services::state_machine::TransitionValidator;
use crate::services::store::DocumentStore;

pub struct LifecycleService {
    store: Arc<dyn DocumentStore>,
    transitions: TransitionValidator,
    stamping: StampingOrchestrator,
    cancellation: CancellationOrchestrator,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        stamping: StampingOrchestrator,
        cancellation: CancellationOrchestrator,
    ) -> Self {
        Self {
            transitions: TransitionValidator::new(store.clone()),
            store,
            stamping,
            cancellation,
        }
    }

    /// Create a fiscal document in DRAFT for a commercial invoice.
    ///
    /// A new document is allowed only once every earlier document for the
    /// same invoice has reached CANCELLED (or its ARCHIVED bookkeeping
    /// state).
    #[instrument(skip(self, new), fields(source_invoice_ref = %new.source_invoice_ref))]
    pub async fn create_document(
        &self,
        new: NewDocument,
    ) -> Result<FiscalDocument, DocumentError> {
        if new.source_invoice_ref.trim().is_empty() {
            return Err(DocumentError::Validation(
                "source invoice reference must not be empty".to_string(),
            ));
        }

        let existing = self
            .store
            .documents_for_invoice(&new.source_invoice_ref)
            .await?;
        if existing.iter().any(|doc| {
            !matches!(
                doc.status,
                DocumentStatus::Cancelled | DocumentStatus::Archived
            )
        }) {
            return Err(DocumentError::ActiveDocumentExists(
                new.source_invoice_ref.clone(),
            ));
        }

        let doc = FiscalDocument::draft(new);
        self.store.insert_document(&doc).await?;
        tracing::info!(
            document_id = %doc.id,
            source_invoice_ref = %doc.source_invoice_ref,
            "Fiscal document created"
        );
        Ok(doc)
    }

    pub async fn document(&self, id: Uuid) -> Result<FiscalDocument, DocumentError> {
        self.store
            .document(id)
            .await?
            .ok_or(DocumentError::NotFound(id))
    }

    /// The audit trail of every authority interaction for a document.
    pub async fn response_log(&self, id: Uuid) -> Result<Vec<ResponseLogEntry>, DocumentError> {
        // Confirm the document exists so an empty log is distinguishable
        // from a bad id.
        self.document(id).await?;
        Ok(self.store.log_for_document(id).await?)
    }

    pub async fn request_stamp(&self, id: Uuid) -> Result<FiscalDocument, StampError> {
        self.stamping.request_stamp(id).await
    }

    pub async fn request_cancellation(
        &self,
        id: Uuid,
        motive: CancellationMotive,
        substitution_uuid: Option<String>,
    ) -> Result<FiscalDocument, CancelError> {
        self.cancellation
            .request_cancellation(id, motive, substitution_uuid)
            .await
    }

    /// Move a CANCELLED document to ARCHIVED. Bookkeeping only; when to call
    /// it is the retention policy's business.
    #[instrument(skip(self), fields(document_id = %id))]
    pub async fn archive_document(&self, id: Uuid) -> Result<FiscalDocument, DocumentError> {
        let doc = self.document(id).await?;
        Ok(self
            .transitions
            .transition(&doc, DocumentStatus::Cancelled, DocumentStatus::Archived)
            .await?)
    }
}
