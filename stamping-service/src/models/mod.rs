//! Domain models for stamping-service.

pub mod document;
pub mod response_log;

pub use document::{
    CancellationMotive, DocumentStatus, FiscalDocument, NewDocument, PaymentMethod, SyncStatus,
    UnknownValue,
};
pub use response_log::{OperationType, ResponseLogEntry};
