//! Single source of truth for fiscal document status transitions.
//!
//! No other component writes `status`. Orchestrators stage auxiliary field
//! changes on a copy of the document and hand it here; the commit is
//! version-guarded so a concurrent writer surfaces as `StaleVersion` instead
//! of silently losing a transition.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::error::{StoreError, TransitionError};
use crate::models::{DocumentStatus, FiscalDocument};
use crate::services::store::DocumentStore;

/// Legal status edges. Everything else is a caller error.
fn is_legal(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Draft, Processing)
            | (Processing, Stamped)
            | (Processing, Error)
            | (Error, Processing)
            | (Stamped, CancelPending)
            | (CancelPending, Cancelled)
            | (CancelPending, Stamped)
            | (Cancelled, Archived)
    )
}

#[derive(Clone)]
pub struct TransitionValidator {
    store: Arc<dyn DocumentStore>,
}

impl TransitionValidator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Commit `doc` with its status moved from `from_expected` to `to`.
    ///
    /// `doc` carries whatever auxiliary changes the caller staged (authority
    /// uuid, cancellation fields, sync status). The write succeeds only if
    /// the stored version still equals `doc.version`; the returned document
    /// carries the incremented version.
    #[instrument(skip(self, doc), fields(document_id = %doc.id, from = %from_expected, to = %to))]
    pub async fn transition(
        &self,
        doc: &FiscalDocument,
        from_expected: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<FiscalDocument, TransitionError> {
        if doc.status != from_expected || !is_legal(from_expected, to) {
            return Err(TransitionError::InvalidTransition {
                from: doc.status,
                to,
            });
        }

        let mut updated = doc.clone();
        updated.status = to;
        updated.version = doc.version + 1;
        updated.updated_utc = Utc::now();

        match self.store.update_document(&updated, doc.version).await {
            Ok(()) => {
                tracing::info!(
                    document_id = %updated.id,
                    from = %from_expected,
                    to = %to,
                    version = updated.version,
                    "Status transition committed"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict) => Err(TransitionError::StaleVersion),
            Err(e) => Err(TransitionError::Store(e)),
        }
    }
}
