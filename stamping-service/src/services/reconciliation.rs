//! Reconciliation of ambiguous authority outcomes.
//!
//! When the adapter cannot tell whether the authority processed a request,
//! the only safe move is to ask the authority. Resubmitting is never safe: a
//! stamp that succeeded but was never confirmed would be minted twice, and a
//! duplicate stamped document cannot simply be deleted.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::error::{CancelError, StampError, StoreError};
use crate::models::{DocumentStatus, FiscalDocument, SyncStatus};
use crate::services::authority::{
    idempotency_key, AuthorityClient, AuthorityState, QueryOutcome,
};
use crate::services::metrics::{ERRORS_TOTAL, RECONCILIATION_POLLS_TOTAL};
use crate::services::response_log::ResponseLog;
use crate::services::state_machine::TransitionValidator;
use crate::services::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Bound on status polls before the document goes to ERROR for manual
    /// review.
    pub max_polls: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_polls: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

pub struct ReconciliationService {
    store: Arc<dyn DocumentStore>,
    authority: Arc<dyn AuthorityClient>,
    transitions: TransitionValidator,
    log: ResponseLog,
    config: ReconciliationConfig,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        authority: Arc<dyn AuthorityClient>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            transitions: TransitionValidator::new(store.clone()),
            log: ResponseLog::new(store.clone()),
            store,
            authority,
            config,
        }
    }

    fn poll_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Resolve a PROCESSING document whose stamp outcome is unknown.
    ///
    /// Queries with the same deterministic idempotency key the submission
    /// used. A prior success commits STAMPED with the authority-issued uuid;
    /// polls exhausting without an answer commit ERROR with the
    /// manual-review flag set. Never resubmits.
    #[instrument(skip(self, doc, fallback_series, fallback_number), fields(document_id = %doc.id))]
    pub async fn resolve_stamp(
        &self,
        doc: &FiscalDocument,
        fallback_series: Option<String>,
        fallback_number: Option<String>,
    ) -> Result<FiscalDocument, StampError> {
        let key = idempotency_key(doc.id);
        let mut backoff = self.poll_backoff();

        for attempt in 1..=self.config.max_polls {
            let response = self.authority.query_status(&key).await;
            self.log.record_status_query(doc.id, &response).await?;

            match response.outcome {
                QueryOutcome::Found { uuid, .. } => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["found"])
                        .inc();
                    tracing::info!(
                        document_id = %doc.id,
                        authority_uuid = %uuid,
                        attempt,
                        "Ambiguous stamp resolved to success"
                    );
                    let mut staged = doc.clone();
                    staged.authority_uuid = Some(uuid);
                    staged.series = fallback_series.clone();
                    staged.number = fallback_number.clone();
                    staged.sync_status = SyncStatus::Idle;
                    staged.last_error = None;
                    return Ok(self
                        .transitions
                        .transition(&staged, DocumentStatus::Processing, DocumentStatus::Stamped)
                        .await?);
                }
                QueryOutcome::NotFound => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["not_found"])
                        .inc();
                    tracing::debug!(document_id = %doc.id, attempt, "No record at the authority yet");
                }
                QueryOutcome::Unavailable { reason } => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["unavailable"])
                        .inc();
                    tracing::warn!(document_id = %doc.id, attempt, reason = %reason, "Status query unavailable");
                }
            }

            if attempt < self.config.max_polls {
                if let Some(delay) = backoff.next_backoff() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(
            document_id = %doc.id,
            polls = self.config.max_polls,
            "Stamp outcome unconfirmed; flagging for manual review"
        );
        let mut staged = doc.clone();
        staged.sync_status = SyncStatus::Error;
        staged.last_error = Some("stamp outcome unconfirmed after reconciliation".to_string());
        self.transitions
            .transition(&staged, DocumentStatus::Processing, DocumentStatus::Error)
            .await?;
        Err(StampError::Unconfirmed)
    }

    /// Settle a CANCEL_PENDING document by asking the authority whether the
    /// cancellation went through. Leaves the document pending when the
    /// authority still shows it active or cannot answer.
    #[instrument(skip(self, doc), fields(document_id = %doc.id))]
    pub async fn resolve_pending_cancellation(
        &self,
        doc: &FiscalDocument,
    ) -> Result<FiscalDocument, CancelError> {
        let authority_uuid = doc
            .authority_uuid
            .clone()
            .ok_or_else(|| CancelError::NotAllowed("document has no authority uuid".to_string()))?;

        let mut backoff = self.poll_backoff();

        for attempt in 1..=self.config.max_polls {
            let response = self.authority.query_status(&authority_uuid).await;

            match &response.outcome {
                QueryOutcome::Found {
                    state: AuthorityState::Cancelled,
                    ..
                } => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["found"])
                        .inc();
                    self.log.record_cancel_confirm(doc.id, &response).await?;
                    tracing::info!(document_id = %doc.id, attempt, "Pending cancellation confirmed");
                    let mut staged = doc.clone();
                    staged.sync_status = SyncStatus::Idle;
                    if staged.cancellation_utc.is_none() {
                        staged.cancellation_utc = Some(chrono::Utc::now());
                    }
                    return Ok(self
                        .transitions
                        .transition(
                            &staged,
                            DocumentStatus::CancelPending,
                            DocumentStatus::Cancelled,
                        )
                        .await?);
                }
                QueryOutcome::Found { .. } => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["not_found"])
                        .inc();
                    self.log.record_status_query(doc.id, &response).await?;
                    tracing::debug!(document_id = %doc.id, attempt, "Authority still shows the document active");
                }
                QueryOutcome::NotFound | QueryOutcome::Unavailable { .. } => {
                    RECONCILIATION_POLLS_TOTAL
                        .with_label_values(&["unavailable"])
                        .inc();
                    self.log.record_status_query(doc.id, &response).await?;
                }
            }

            if attempt < self.config.max_polls {
                if let Some(delay) = backoff.next_backoff() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Still pending; the next sweep tries again.
        Ok(doc.clone())
    }

    /// Re-drive documents whose last authority call never resolved: stamps
    /// interrupted by a crash and cancellations the authority left pending.
    pub async fn sweep(&self) -> Result<(), StoreError> {
        let pending = self.store.documents_with_pending_sync().await?;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::info!(count = pending.len(), "Reconciliation sweep started");

        for doc in pending {
            let result = match doc.status {
                DocumentStatus::Processing => self
                    .resolve_stamp(&doc, doc.series.clone(), doc.number.clone())
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                DocumentStatus::CancelPending => self
                    .resolve_pending_cancellation(&doc)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                _ => Ok(()),
            };
            if let Err(error) = result {
                ERRORS_TOTAL.with_label_values(&["sweep"]).inc();
                tracing::warn!(document_id = %doc.id, error = %error, "Sweep resolution failed");
            }
        }
        Ok(())
    }
}
