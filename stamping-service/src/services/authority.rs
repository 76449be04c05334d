//! Authority client contract and normalized responses.
//!
//! The adapter is the only component that talks to the certification
//! authority. Every outcome, including transport failures, is normalized to
//! one of the closed result sets below; callers never see a raw transport
//! error and decide state transitions from the outcome alone.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{CancellationMotive, PaymentMethod};
use crate::providers::InvoiceLine;

/// Document payload submitted for certification, assembled by the
/// collaborators. The orchestrator treats it as opaque.
#[derive(Debug, Clone, Serialize)]
pub struct StampPayload {
    pub document_id: Uuid,
    pub source_invoice_ref: String,
    pub series: Option<String>,
    pub number: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_form_code: String,
    pub tax_use_code: String,
    pub customer_ref: String,
    pub customer_tax_id: String,
    pub customer_tax_regime: String,
    pub lines: Vec<InvoiceLine>,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_xml: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StampOutcome {
    Success {
        uuid: String,
        series: Option<String>,
        number: Option<String>,
    },
    Rejected {
        code: String,
        message: String,
    },
    /// The request may or may not have been processed; only a status query
    /// can tell.
    Ambiguous {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct StampResponse {
    pub outcome: StampOutcome,
    pub status_code: Option<i32>,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Accepted,
    /// The authority needs time; the document stays CANCEL_PENDING until a
    /// later status query settles it.
    Pending,
    Rejected {
        code: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct CancelResponse {
    pub outcome: CancelOutcome,
    pub status_code: Option<i32>,
    pub raw: String,
}

/// State of a document as known to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityState {
    Active,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Found {
        uuid: String,
        state: AuthorityState,
    },
    NotFound,
    /// The query itself failed; nothing is known.
    Unavailable {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub outcome: QueryOutcome,
    pub status_code: Option<i32>,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub authority_uuid: String,
    pub motive: CancellationMotive,
    pub substitution_uuid: Option<String>,
}

#[async_trait]
pub trait AuthorityClient: Send + Sync {
    async fn stamp(&self, payload: &StampPayload, idempotency_key: &str) -> StampResponse;

    async fn cancel(&self, request: &CancelRequest) -> CancelResponse;

    async fn query_status(&self, key: &str) -> QueryResponse;
}

/// Deterministic idempotency key for a document's stamp submission.
///
/// Derived from the document id, never freshly generated, so a query after an
/// ambiguous outcome matches the prior attempt on the authority side.
pub fn idempotency_key(document_id: Uuid) -> String {
    format!("fd-{}", document_id.simple())
}
