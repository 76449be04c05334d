//! Postgres-backed document store for stamping-service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CancellationMotive, DocumentStatus, FiscalDocument, OperationType, PaymentMethod,
    ResponseLogEntry, SyncStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::DocumentStore;

const DOCUMENT_COLUMNS: &str = "id, source_invoice_ref, branch_ref, status, sync_status, \
     authority_uuid, series, number, payment_method, payment_form_code, tax_use_code, \
     cancellation_motive, substitution_uuid, cancellation_utc, last_error, version, \
     created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    source_invoice_ref: String,
    branch_ref: Option<String>,
    status: String,
    sync_status: String,
    authority_uuid: Option<String>,
    series: Option<String>,
    number: Option<String>,
    payment_method: String,
    payment_form_code: String,
    tax_use_code: String,
    cancellation_motive: Option<String>,
    substitution_uuid: Option<String>,
    cancellation_utc: Option<DateTime<Utc>>,
    last_error: Option<String>,
    version: i64,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for FiscalDocument {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let motive = row
            .cancellation_motive
            .as_deref()
            .map(CancellationMotive::from_code)
            .transpose()
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;
        Ok(FiscalDocument {
            id: row.id,
            source_invoice_ref: row.source_invoice_ref,
            branch_ref: row.branch_ref,
            status: DocumentStatus::from_str(&row.status)
                .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
            sync_status: SyncStatus::from_str(&row.sync_status)
                .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
            authority_uuid: row.authority_uuid,
            series: row.series,
            number: row.number,
            payment_method: PaymentMethod::from_str(&row.payment_method)
                .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
            payment_form_code: row.payment_form_code,
            tax_use_code: row.tax_use_code,
            cancellation_motive: motive,
            substitution_uuid: row.substitution_uuid,
            cancellation_utc: row.cancellation_utc,
            last_error: row.last_error,
            version: row.version,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: Uuid,
    fiscal_document_id: Uuid,
    timestamp_utc: DateTime<Utc>,
    operation: String,
    success: bool,
    status_code: Option<i32>,
    raw_payload: String,
    error_message: Option<String>,
}

impl TryFrom<LogRow> for ResponseLogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(ResponseLogEntry {
            id: row.id,
            fiscal_document_id: row.fiscal_document_id,
            timestamp_utc: row.timestamp_utc,
            operation: OperationType::from_str(&row.operation)
                .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
            success: row.success,
            status_code: row.status_code,
            raw_payload: row.raw_payload,
            error_message: row.error_message,
        })
    }
}

impl PgDocumentStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "stamping-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert_document(&self, doc: &FiscalDocument) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_document"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO fiscal_documents
                (id, source_invoice_ref, branch_ref, status, sync_status, authority_uuid,
                 series, number, payment_method, payment_form_code, tax_use_code,
                 cancellation_motive, substitution_uuid, cancellation_utc, last_error,
                 version, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(doc.id)
        .bind(&doc.source_invoice_ref)
        .bind(&doc.branch_ref)
        .bind(doc.status.as_str())
        .bind(doc.sync_status.as_str())
        .bind(&doc.authority_uuid)
        .bind(&doc.series)
        .bind(&doc.number)
        .bind(doc.payment_method.as_str())
        .bind(&doc.payment_form_code)
        .bind(&doc.tax_use_code)
        .bind(doc.cancellation_motive.map(|m| m.code()))
        .bind(&doc.substitution_uuid)
        .bind(doc.cancellation_utc)
        .bind(&doc.last_error)
        .bind(doc.version)
        .bind(doc.created_utc)
        .bind(doc.updated_utc)
        .execute(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<FiscalDocument>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_document"])
            .start_timer();

        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM fiscal_documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        row.map(FiscalDocument::try_from).transpose()
    }

    async fn documents_for_invoice(
        &self,
        source_invoice_ref: &str,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["documents_for_invoice"])
            .start_timer();

        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM fiscal_documents WHERE source_invoice_ref = $1 ORDER BY created_utc",
            DOCUMENT_COLUMNS
        ))
        .bind(source_invoice_ref)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        rows.into_iter().map(FiscalDocument::try_from).collect()
    }

    async fn document_by_authority_uuid(
        &self,
        authority_uuid: &str,
    ) -> Result<Option<FiscalDocument>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["document_by_authority_uuid"])
            .start_timer();

        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM fiscal_documents WHERE authority_uuid = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(authority_uuid)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        row.map(FiscalDocument::try_from).transpose()
    }

    async fn update_document(
        &self,
        doc: &FiscalDocument,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_document"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents
            SET status = $2,
                sync_status = $3,
                authority_uuid = $4,
                series = $5,
                number = $6,
                cancellation_motive = $7,
                substitution_uuid = $8,
                cancellation_utc = $9,
                last_error = $10,
                version = $11,
                updated_utc = $12
            WHERE id = $1 AND version = $13
            "#,
        )
        .bind(doc.id)
        .bind(doc.status.as_str())
        .bind(doc.sync_status.as_str())
        .bind(&doc.authority_uuid)
        .bind(&doc.series)
        .bind(&doc.number)
        .bind(doc.cancellation_motive.map(|m| m.code()))
        .bind(&doc.substitution_uuid)
        .bind(doc.cancellation_utc)
        .bind(&doc.last_error)
        .bind(doc.version)
        .bind(doc.updated_utc)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        timer.observe_duration();

        // Zero rows means the version moved under us (the document was read
        // before being updated, so it exists).
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn documents_with_pending_sync(&self) -> Result<Vec<FiscalDocument>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["documents_with_pending_sync"])
            .start_timer();

        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM fiscal_documents \
             WHERE sync_status = 'pending' AND status IN ('processing', 'cancel_pending') \
             ORDER BY created_utc",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        rows.into_iter().map(FiscalDocument::try_from).collect()
    }

    async fn append_log(&self, entry: &ResponseLogEntry) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_log"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO response_log
                (id, fiscal_document_id, timestamp_utc, operation, success, status_code,
                 raw_payload, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.fiscal_document_id)
        .bind(entry.timestamp_utc)
        .bind(entry.operation.as_str())
        .bind(entry.success)
        .bind(entry.status_code)
        .bind(&entry.raw_payload)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    async fn log_for_document(&self, id: Uuid) -> Result<Vec<ResponseLogEntry>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["log_for_document"])
            .start_timer();

        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, fiscal_document_id, timestamp_utc, operation, success, status_code,
                   raw_payload, error_message
            FROM response_log
            WHERE fiscal_document_id = $1
            ORDER BY timestamp_utc, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        rows.into_iter().map(ResponseLogEntry::try_from).collect()
    }
}
