//! Stamping orchestration: DRAFT/ERROR -> PROCESSING -> {STAMPED, ERROR}.
//!
//! The orchestrator is the only caller of the transition validator on this
//! path; nothing fires implicitly on save. The order of operations is load-
//! bearing: validate before the guard, guard before the transition, log
//! before any status commit.

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{StampError, TransitionError};
use crate::models::{DocumentStatus, FiscalDocument, SyncStatus};
use crate::providers::PayloadBuilder;
use crate::services::authority::{idempotency_key, AuthorityClient, StampOutcome};
use crate::services::guard::SubmissionGuard;
use crate::services::metrics::STAMP_REQUESTS_TOTAL;
use crate::services::reconciliation::ReconciliationService;
use crate::services::response_log::ResponseLog;
use crate::services::state_machine::TransitionValidator;
use crate::services::store::DocumentStore;
use crate::services::validation::DocumentValidator;

pub struct StampingOrchestrator {
    store: Arc<dyn DocumentStore>,
    authority: Arc<dyn AuthorityClient>,
    transitions: TransitionValidator,
    log: ResponseLog,
    guard: SubmissionGuard,
    payloads: PayloadBuilder,
    validator: DocumentValidator,
    reconciliation: Arc<ReconciliationService>,
}

impl StampingOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        authority: Arc<dyn AuthorityClient>,
        guard: SubmissionGuard,
        payloads: PayloadBuilder,
        validator: DocumentValidator,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            transitions: TransitionValidator::new(store.clone()),
            log: ResponseLog::new(store.clone()),
            store,
            authority,
            guard,
            payloads,
            validator,
            reconciliation,
        }
    }

    /// Submit a DRAFT or ERROR document to the authority for certification.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn request_stamp(&self, document_id: Uuid) -> Result<FiscalDocument, StampError> {
        let doc = self
            .store
            .document(document_id)
            .await?
            .ok_or(StampError::NotFound(document_id))?;

        // Pre-flight: no external call until the document is sound.
        if !matches!(doc.status, DocumentStatus::Draft | DocumentStatus::Error) {
            STAMP_REQUESTS_TOTAL
                .with_label_values(&["validation_failed"])
                .inc();
            return Err(StampError::Transition(TransitionError::InvalidTransition {
                from: doc.status,
                to: DocumentStatus::Processing,
            }));
        }
        if let Err(failure) = self.validator.validate_for_stamping(&doc) {
            STAMP_REQUESTS_TOTAL
                .with_label_values(&["validation_failed"])
                .inc();
            return Err(StampError::Validation(failure.to_string()));
        }

        // At most one stamped or cancel-pending document per invoice.
        let siblings = self
            .store
            .documents_for_invoice(&doc.source_invoice_ref)
            .await?;
        if siblings
            .iter()
            .any(|sibling| sibling.id != doc.id && sibling.is_active())
        {
            STAMP_REQUESTS_TOTAL
                .with_label_values(&["validation_failed"])
                .inc();
            return Err(StampError::Validation(format!(
                "invoice {} already has an active fiscal document",
                doc.source_invoice_ref
            )));
        }

        // Serialize submissions per invoice. Held elsewhere means a live
        // submission is in flight; fail, never queue.
        let _permit = self
            .guard
            .try_acquire(&doc.source_invoice_ref)
            .ok_or_else(|| {
                STAMP_REQUESTS_TOTAL
                    .with_label_values(&["duplicate"])
                    .inc();
                StampError::DuplicateSubmission(doc.source_invoice_ref.clone())
            })?;

        // Collaborator data next: a provider failure here leaves the
        // document untouched.
        let payload = self.payloads.build(&doc).await?;

        // Enter PROCESSING with the version read at the start; a stale
        // version means another submission won the race past the guard TTL.
        let mut staged = doc.clone();
        staged.sync_status = SyncStatus::Pending;
        staged.last_error = None;
        let processing = match self
            .transitions
            .transition(&staged, doc.status, DocumentStatus::Processing)
            .await
        {
            Ok(processing) => processing,
            Err(TransitionError::StaleVersion) => {
                STAMP_REQUESTS_TOTAL
                    .with_label_values(&["duplicate"])
                    .inc();
                return Err(StampError::DuplicateSubmission(
                    doc.source_invoice_ref.clone(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let key = idempotency_key(processing.id);
        let response = self.authority.stamp(&payload, &key).await;

        // Log first, commit status second; a crash between the two leaves a
        // PROCESSING document the sweep can still reconcile from the log.
        self.log.record_stamp(processing.id, &response).await?;

        match response.outcome {
            StampOutcome::Success {
                uuid,
                series,
                number,
            } => {
                let mut staged = processing.clone();
                staged.authority_uuid = Some(uuid);
                staged.series = series.or_else(|| payload.series.clone());
                staged.number = number.or_else(|| payload.number.clone());
                staged.sync_status = SyncStatus::Idle;
                let stamped = self
                    .transitions
                    .transition(&staged, DocumentStatus::Processing, DocumentStatus::Stamped)
                    .await?;
                STAMP_REQUESTS_TOTAL.with_label_values(&["stamped"]).inc();
                tracing::info!(
                    document_id = %stamped.id,
                    authority_uuid = ?stamped.authority_uuid,
                    "Document stamped"
                );
                Ok(stamped)
            }
            StampOutcome::Rejected { code, message } => {
                let mut staged = processing.clone();
                staged.sync_status = SyncStatus::Idle;
                staged.last_error = Some(format!("[{}] {}", code, message));
                self.transitions
                    .transition(&staged, DocumentStatus::Processing, DocumentStatus::Error)
                    .await?;
                STAMP_REQUESTS_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::warn!(
                    document_id = %processing.id,
                    code = %code,
                    "Authority rejected the document"
                );
                Err(StampError::AuthorityRejection { code, message })
            }
            StampOutcome::Ambiguous { reason } => {
                tracing::warn!(
                    document_id = %processing.id,
                    reason = %reason,
                    "Ambiguous stamp outcome; reconciling"
                );
                let result = self
                    .reconciliation
                    .resolve_stamp(&processing, payload.series.clone(), payload.number.clone())
                    .await;
                match &result {
                    Ok(_) => STAMP_REQUESTS_TOTAL.with_label_values(&["stamped"]).inc(),
                    Err(_) => STAMP_REQUESTS_TOTAL
                        .with_label_values(&["unconfirmed"])
                        .inc(),
                }
                result
            }
        }
        // The permit drops here, releasing the guard on every path.
    }
}
