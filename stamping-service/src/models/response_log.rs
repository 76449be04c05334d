//! Response log model: the append-only audit record of every authority
//! interaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::document::UnknownValue;

/// Kind of authority interaction an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Stamp,
    CancelRequest,
    CancelConfirm,
    StatusQuery,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Stamp => "stamp",
            OperationType::CancelRequest => "cancel_request",
            OperationType::CancelConfirm => "cancel_confirm",
            OperationType::StatusQuery => "status_query",
        }
    }
}

impl FromStr for OperationType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stamp" => Ok(OperationType::Stamp),
            "cancel_request" => Ok(OperationType::CancelRequest),
            "cancel_confirm" => Ok(OperationType::CancelConfirm),
            "status_query" => Ok(OperationType::StatusQuery),
            other => Err(UnknownValue::new("operation type", other)),
        }
    }
}

/// One authority interaction. Entries are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseLogEntry {
    pub id: Uuid,
    pub fiscal_document_id: Uuid,
    pub timestamp_utc: DateTime<Utc>,
    pub operation: OperationType,
    pub success: bool,
    pub status_code: Option<i32>,
    pub raw_payload: String,
    pub error_message: Option<String>,
}
