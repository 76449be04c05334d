//! Fiscal document handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    CancellationMotive, FiscalDocument, NewDocument, PaymentMethod, ResponseLogEntry,
};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1))]
    pub source_invoice_ref: String,
    pub branch_ref: Option<String>,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1))]
    pub payment_form_code: String,
    #[validate(length(min = 1))]
    pub tax_use_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelDocumentRequest {
    #[validate(length(equal = 2))]
    pub motive_code: String,
    pub substitution_uuid: Option<String>,
}

/// Create a fiscal document in DRAFT for a commercial invoice.
pub async fn create_document(
    State(state): State<AppState>,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<FiscalDocument>), AppError> {
    payload.validate()?;

    let doc = state
        .lifecycle
        .create_document(NewDocument {
            source_invoice_ref: payload.source_invoice_ref,
            branch_ref: payload.branch_ref,
            payment_method: payload.payment_method,
            payment_form_code: payload.payment_form_code,
            tax_use_code: payload.tax_use_code,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(doc)))
}

/// Submit a document to the authority for certification.
pub async fn stamp_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<FiscalDocument>, AppError> {
    let doc = state.lifecycle.request_stamp(document_id).await?;
    Ok(Json(doc))
}

/// Ask the authority to cancel a stamped document.
pub async fn cancel_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<CancelDocumentRequest>,
) -> Result<Json<FiscalDocument>, AppError> {
    payload.validate()?;

    let motive = CancellationMotive::from_code(&payload.motive_code)
        .map_err(|e| AppError::BadRequest(anyhow::Error::new(e)))?;

    let doc = state
        .lifecycle
        .request_cancellation(document_id, motive, payload.substitution_uuid)
        .await?;
    Ok(Json(doc))
}

/// Current state of a document.
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<FiscalDocument>, AppError> {
    let doc = state.lifecycle.document(document_id).await?;
    Ok(Json(doc))
}

/// The audit trail of authority interactions for a document.
pub async fn get_document_log(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<ResponseLogEntry>>, AppError> {
    let entries = state.lifecycle.response_log(document_id).await?;
    Ok(Json(entries))
}

/// Move a CANCELLED document to ARCHIVED.
pub async fn archive_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<FiscalDocument>, AppError> {
    let doc = state.lifecycle.archive_document(document_id).await?;
    Ok(Json(doc))
}
