//! Cancellation orchestration: STAMPED -> CANCEL_PENDING -> {CANCELLED, STAMPED}.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::CancelError;
use crate::models::{CancellationMotive, DocumentStatus, FiscalDocument, SyncStatus};
use crate::services::authority::{AuthorityClient, CancelOutcome, CancelRequest};
use crate::services::metrics::CANCEL_REQUESTS_TOTAL;
use crate::services::response_log::ResponseLog;
use crate::services::state_machine::TransitionValidator;
use crate::services::store::DocumentStore;

pub struct CancellationOrchestrator {
    store: Arc<dyn DocumentStore>,
    authority: Arc<dyn AuthorityClient>,
    transitions: TransitionValidator,
    log: ResponseLog,
}

impl CancellationOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, authority: Arc<dyn AuthorityClient>) -> Self {
        Self {
            transitions: TransitionValidator::new(store.clone()),
            log: ResponseLog::new(store.clone()),
            store,
            authority,
        }
    }

    /// Ask the authority to cancel a stamped document.
    #[instrument(skip(self), fields(document_id = %document_id, motive = motive.code()))]
    pub async fn request_cancellation(
        &self,
        document_id: Uuid,
        motive: CancellationMotive,
        substitution_uuid: Option<String>,
    ) -> Result<FiscalDocument, CancelError> {
        let doc = self
            .store
            .document(document_id)
            .await?
            .ok_or(CancelError::NotFound(document_id))?;

        if doc.status != DocumentStatus::Stamped {
            return Err(CancelError::NotAllowed(format!(
                "document is {}, only stamped documents can be cancelled",
                doc.status
            )));
        }
        let authority_uuid = doc.authority_uuid.clone().ok_or_else(|| {
            CancelError::NotAllowed("stamped document has no authority uuid".to_string())
        })?;

        // Motive 01 must name the replacement document, and it has to be a
        // real stamped document, before anything leaves this process.
        let substitution = match (motive.requires_substitution(), substitution_uuid) {
            (true, None) => {
                return Err(CancelError::Validation(format!(
                    "motive {} requires a substitution uuid",
                    motive.code()
                )));
            }
            (true, Some(substitution)) => {
                let replacement = self
                    .store
                    .document_by_authority_uuid(&substitution)
                    .await?
                    .ok_or_else(|| {
                        CancelError::Validation(format!(
                            "substitution uuid {} does not reference a known document",
                            substitution
                        ))
                    })?;
                if replacement.status != DocumentStatus::Stamped {
                    return Err(CancelError::Validation(format!(
                        "substitution document {} is {}, expected stamped",
                        replacement.id, replacement.status
                    )));
                }
                Some(substitution)
            }
            (false, Some(_)) => {
                return Err(CancelError::Validation(format!(
                    "substitution uuid only applies to motive 01, got {}",
                    motive.code()
                )));
            }
            (false, None) => None,
        };

        let mut staged = doc.clone();
        staged.cancellation_motive = Some(motive);
        staged.substitution_uuid = substitution.clone();
        staged.sync_status = SyncStatus::Pending;
        staged.last_error = None;
        let pending = self
            .transitions
            .transition(&staged, DocumentStatus::Stamped, DocumentStatus::CancelPending)
            .await?;

        let request = CancelRequest {
            authority_uuid,
            motive,
            substitution_uuid: substitution,
        };
        let response = self.authority.cancel(&request).await;

        // Log first, commit status second.
        self.log.record_cancel_request(pending.id, &response).await?;

        match response.outcome {
            CancelOutcome::Accepted => {
                let mut staged = pending.clone();
                staged.sync_status = SyncStatus::Idle;
                staged.cancellation_utc = Some(Utc::now());
                let cancelled = self
                    .transitions
                    .transition(
                        &staged,
                        DocumentStatus::CancelPending,
                        DocumentStatus::Cancelled,
                    )
                    .await?;
                CANCEL_REQUESTS_TOTAL
                    .with_label_values(&["cancelled"])
                    .inc();
                tracing::info!(document_id = %cancelled.id, "Document cancelled");
                Ok(cancelled)
            }
            CancelOutcome::Pending => {
                // The authority needs time; the reconciliation sweep settles
                // the document later.
                CANCEL_REQUESTS_TOTAL.with_label_values(&["pending"]).inc();
                tracing::info!(document_id = %pending.id, "Cancellation pending at the authority");
                Ok(pending)
            }
            CancelOutcome::Rejected { code, message } => {
                let mut staged = pending.clone();
                staged.sync_status = SyncStatus::Idle;
                staged.cancellation_motive = None;
                staged.substitution_uuid = None;
                staged.last_error = Some(format!("[{}] {}", code, message));
                self.transitions
                    .transition(&staged, DocumentStatus::CancelPending, DocumentStatus::Stamped)
                    .await?;
                CANCEL_REQUESTS_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::warn!(
                    document_id = %pending.id,
                    code = %code,
                    "Authority rejected the cancellation; document reverted to stamped"
                );
                Err(CancelError::AuthorityRejection { code, message })
            }
        }
    }
}
