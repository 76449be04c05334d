//! Domain error taxonomy.
//!
//! Validation and transition errors are returned synchronously and never
//! retried automatically. Ambiguous authority outcomes are resolved by the
//! reconciliation service before any error surfaces, so callers only observe
//! well-defined terminal outcomes.

use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::DocumentStatus;
use crate::providers::ProviderError;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    /// The row changed since it was read, or a uniqueness rule was violated.
    #[error("version conflict")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict
            }
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Backend(anyhow::Error::new(err)),
        }
    }
}

/// Failures of the single status writer.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Optimistic-concurrency conflict: the document changed since the caller
    /// read it.
    #[error("stale version: document changed since it was read")]
    StaleVersion,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a stamp request.
#[derive(Debug, Error)]
pub enum StampError {
    /// Pre-flight failure; no external call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another submission for the same invoice is already in flight.
    #[error("a submission for invoice {0} is already in flight")]
    DuplicateSubmission(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The authority explicitly refused the document.
    #[error("authority rejected the document: [{code}] {message}")]
    AuthorityRejection { code: String, message: String },

    /// The authority's outcome could not be confirmed within the
    /// reconciliation bounds; the document is flagged for manual review.
    #[error("authority outcome unconfirmed; document flagged for manual review")]
    Unconfirmed,

    #[error("fiscal document {0} not found")]
    NotFound(Uuid),

    #[error("collaborator failure: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a cancellation request.
#[derive(Debug, Error)]
pub enum CancelError {
    /// The document is not in a cancellable state.
    #[error("cancellation not allowed: {0}")]
    NotAllowed(String),

    /// Pre-flight failure; no external call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The authority refused the cancellation; the document reverted to
    /// STAMPED.
    #[error("authority rejected the cancellation: [{code}] {message}")]
    AuthorityRejection { code: String, message: String },

    #[error("fiscal document {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the plain document operations (create, archive, lookups).
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// A document for the same invoice has not reached CANCELLED yet.
    #[error("invoice {0} already has a fiscal document in progress")]
    ActiveDocumentExists(String),

    #[error("fiscal document {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StampError> for AppError {
    fn from(err: StampError) -> Self {
        let msg = err.to_string();
        match err {
            StampError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(msg)),
            StampError::DuplicateSubmission(_) | StampError::Transition(_) => {
                AppError::Conflict(anyhow::anyhow!(msg))
            }
            StampError::AuthorityRejection { .. } => AppError::Unprocessable(anyhow::anyhow!(msg)),
            StampError::Unconfirmed | StampError::Provider(_) => AppError::BadGateway(msg),
            StampError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(msg)),
            StampError::Store(_) => AppError::DatabaseError(anyhow::anyhow!(msg)),
        }
    }
}

impl From<CancelError> for AppError {
    fn from(err: CancelError) -> Self {
        let msg = err.to_string();
        match err {
            CancelError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(msg)),
            CancelError::NotAllowed(_) | CancelError::Transition(_) => {
                AppError::Conflict(anyhow::anyhow!(msg))
            }
            CancelError::AuthorityRejection { .. } => AppError::Unprocessable(anyhow::anyhow!(msg)),
            CancelError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(msg)),
            CancelError::Store(_) => AppError::DatabaseError(anyhow::anyhow!(msg)),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        let msg = err.to_string();
        match err {
            DocumentError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(msg)),
            DocumentError::ActiveDocumentExists(_) | DocumentError::Transition(_) => {
                AppError::Conflict(anyhow::anyhow!(msg))
            }
            DocumentError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(msg)),
            DocumentError::Store(_) => AppError::DatabaseError(anyhow::anyhow!(msg)),
        }
    }
}
