//! Fiscal document model for stamping-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error for strings that do not map to a closed enumeration value.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownValue {
    kind: &'static str,
    value: String,
}

impl UnknownValue {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lifecycle status of a fiscal document.
///
/// Only the transition validator writes this field; parsing below is the
/// single point where stored strings become statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Processing,
    Stamped,
    Error,
    CancelPending,
    Cancelled,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Stamped => "stamped",
            DocumentStatus::Error => "error",
            DocumentStatus::CancelPending => "cancel_pending",
            DocumentStatus::Cancelled => "cancelled",
            DocumentStatus::Archived => "archived",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(DocumentStatus::Draft),
            "processing" => Ok(DocumentStatus::Processing),
            "stamped" => Ok(DocumentStatus::Stamped),
            "error" => Ok(DocumentStatus::Error),
            "cancel_pending" => Ok(DocumentStatus::CancelPending),
            "cancelled" => Ok(DocumentStatus::Cancelled),
            "archived" => Ok(DocumentStatus::Archived),
            other => Err(UnknownValue::new("document status", other)),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an authority call is currently outstanding for the document,
/// independent of the lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Pending,
    /// The outcome of an authority call could not be confirmed; a human has
    /// to look at the document.
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(SyncStatus::Idle),
            "pending" => Ok(SyncStatus::Pending),
            "error" => Ok(SyncStatus::Error),
            other => Err(UnknownValue::new("sync status", other)),
        }
    }
}

/// Payment method classification (PUE / PPD in the fiscal vocabulary).
///
/// The classification decides which payment-form code is legally valid: a
/// single payment carries a concrete code, a deferred payment carries the
/// "to be defined" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    SinglePayment,
    DeferredPayment,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::SinglePayment => "single_payment",
            PaymentMethod::DeferredPayment => "deferred_payment",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single_payment" => Ok(PaymentMethod::SinglePayment),
            "deferred_payment" => Ok(PaymentMethod::DeferredPayment),
            other => Err(UnknownValue::new("payment method", other)),
        }
    }
}

/// Legal reason for cancelling a stamped document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMotive {
    /// 01: issued with errors, a substituting document exists.
    ErrorsWithRelation,
    /// 02: issued with errors, no substituting document.
    ErrorsWithoutRelation,
    /// 03: the underlying operation never took place.
    OperationNotCompleted,
    /// 04: nominative operation already covered by a global invoice.
    NominativeGlobalInvoice,
}

impl CancellationMotive {
    pub fn code(&self) -> &'static str {
        match self {
            CancellationMotive::ErrorsWithRelation => "01",
            CancellationMotive::ErrorsWithoutRelation => "02",
            CancellationMotive::OperationNotCompleted => "03",
            CancellationMotive::NominativeGlobalInvoice => "04",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, UnknownValue> {
        match code {
            "01" => Ok(CancellationMotive::ErrorsWithRelation),
            "02" => Ok(CancellationMotive::ErrorsWithoutRelation),
            "03" => Ok(CancellationMotive::OperationNotCompleted),
            "04" => Ok(CancellationMotive::NominativeGlobalInvoice),
            other => Err(UnknownValue::new("cancellation motive", other)),
        }
    }

    /// Motive 01 must name the document that replaces the cancelled one.
    pub fn requires_substitution(&self) -> bool {
        matches!(self, CancellationMotive::ErrorsWithRelation)
    }
}

/// Fiscal document: the legally tracked counterpart of a commercial invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDocument {
    pub id: Uuid,
    /// Reference to the commercial invoice; the invoice itself is owned by a
    /// collaborator.
    pub source_invoice_ref: String,
    /// Branch issuing the document, when the deployment uses branch-scoped
    /// folio numbering.
    pub branch_ref: Option<String>,
    pub status: DocumentStatus,
    pub sync_status: SyncStatus,
    /// Identifier assigned by the authority, populated only after a
    /// successful stamp.
    pub authority_uuid: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_form_code: String,
    pub tax_use_code: String,
    pub cancellation_motive: Option<CancellationMotive>,
    pub substitution_uuid: Option<String>,
    pub cancellation_utc: Option<DateTime<Utc>>,
    /// Most recent rejection or reconciliation failure, duplicated from the
    /// response log for operator convenience.
    pub last_error: Option<String>,
    /// Monotonic counter guarding optimistic-concurrency transitions.
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a fiscal document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source_invoice_ref: String,
    pub branch_ref: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_form_code: String,
    pub tax_use_code: String,
}

impl FiscalDocument {
    /// Create a document in DRAFT, the only status a document starts in.
    pub fn draft(new: NewDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_invoice_ref: new.source_invoice_ref,
            branch_ref: new.branch_ref,
            status: DocumentStatus::Draft,
            sync_status: SyncStatus::Idle,
            authority_uuid: None,
            series: None,
            number: None,
            payment_method: new.payment_method,
            payment_form_code: new.payment_form_code,
            tax_use_code: new.tax_use_code,
            cancellation_motive: None,
            substitution_uuid: None,
            cancellation_utc: None,
            last_error: None,
            version: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// A document in STAMPED or CANCEL_PENDING legally represents its source
    /// invoice; at most one such document may exist per invoice.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Stamped | DocumentStatus::CancelPending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::Processing,
            DocumentStatus::Stamped,
            DocumentStatus::Error,
            DocumentStatus::CancelPending,
            DocumentStatus::Cancelled,
            DocumentStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(
            "STAMPED".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Stamped
        );
        assert!("finalized".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn motive_codes_are_the_legal_enumeration() {
        assert_eq!(
            CancellationMotive::from_code("01").unwrap(),
            CancellationMotive::ErrorsWithRelation
        );
        assert!(CancellationMotive::from_code("01").unwrap().requires_substitution());
        assert!(!CancellationMotive::from_code("02").unwrap().requires_substitution());
        assert!(CancellationMotive::from_code("05").is_err());
    }
}
