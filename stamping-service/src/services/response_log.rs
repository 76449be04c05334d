//! Append-only writer for the authority response log.
//!
//! One entry per authority call, no exceptions. Orchestrators write the
//! entry before committing any status, so every externally observable state
//! has an audit trail even if the process dies between call and commit.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{OperationType, ResponseLogEntry};
use crate::services::authority::{
    CancelOutcome, CancelResponse, QueryOutcome, QueryResponse, StampOutcome, StampResponse,
};
use crate::services::store::DocumentStore;

#[derive(Clone)]
pub struct ResponseLog {
    store: Arc<dyn DocumentStore>,
}

impl ResponseLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn append(
        &self,
        fiscal_document_id: Uuid,
        operation: OperationType,
        success: bool,
        status_code: Option<i32>,
        raw_payload: String,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let entry = ResponseLogEntry {
            id: Uuid::new_v4(),
            fiscal_document_id,
            timestamp_utc: Utc::now(),
            operation,
            success,
            status_code,
            raw_payload,
            error_message,
        };
        self.store.append_log(&entry).await
    }

    pub async fn record_stamp(
        &self,
        fiscal_document_id: Uuid,
        response: &StampResponse,
    ) -> Result<(), StoreError> {
        let (success, error_message) = match &response.outcome {
            StampOutcome::Success { .. } => (true, None),
            StampOutcome::Rejected { code, message } => {
                (false, Some(format!("[{}] {}", code, message)))
            }
            StampOutcome::Ambiguous { reason } => (false, Some(reason.clone())),
        };
        self.append(
            fiscal_document_id,
            OperationType::Stamp,
            success,
            response.status_code,
            response.raw.clone(),
            error_message,
        )
        .await
    }

    pub async fn record_cancel_request(
        &self,
        fiscal_document_id: Uuid,
        response: &CancelResponse,
    ) -> Result<(), StoreError> {
        let (success, error_message) = match &response.outcome {
            CancelOutcome::Accepted | CancelOutcome::Pending => (true, None),
            CancelOutcome::Rejected { code, message } => {
                (false, Some(format!("[{}] {}", code, message)))
            }
        };
        self.append(
            fiscal_document_id,
            OperationType::CancelRequest,
            success,
            response.status_code,
            response.raw.clone(),
            error_message,
        )
        .await
    }

    /// The definitive confirmation of a pending cancellation, observed
    /// through a status query.
    pub async fn record_cancel_confirm(
        &self,
        fiscal_document_id: Uuid,
        response: &QueryResponse,
    ) -> Result<(), StoreError> {
        self.append(
            fiscal_document_id,
            OperationType::CancelConfirm,
            true,
            response.status_code,
            response.raw.clone(),
            None,
        )
        .await
    }

    pub async fn record_status_query(
        &self,
        fiscal_document_id: Uuid,
        response: &QueryResponse,
    ) -> Result<(), StoreError> {
        let (success, error_message) = match &response.outcome {
            QueryOutcome::Found { .. } | QueryOutcome::NotFound => (true, None),
            QueryOutcome::Unavailable { reason } => (false, Some(reason.clone())),
        };
        self.append(
            fiscal_document_id,
            OperationType::StatusQuery,
            success,
            response.status_code,
            response.raw.clone(),
            error_message,
        )
        .await
    }
}
