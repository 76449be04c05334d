//! Application startup and lifecycle management.
//!
//! Wires the store, the authority client, the collaborators and the
//! orchestrators, serves the HTTP API, and runs the background
//! reconciliation sweep.

use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::providers::http::{
    HttpAttachmentRenderer, HttpFolioAllocator, HttpInvoiceProvider, HttpTaxProfileProvider,
};
use crate::providers::PayloadBuilder;
use crate::services::{
    init_metrics, AuthorityClient, CancellationOrchestrator, DocumentStore, DocumentValidator,
    LifecycleService, PacClient, PgDocumentStore, ReconciliationConfig, ReconciliationService,
    StampingOrchestrator, SubmissionGuard, ValidationConfig,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub lifecycle: Arc<LifecycleService>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    reconciliation: Arc<ReconciliationService>,
    sweep_interval: Duration,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store = Arc::new(
            PgDocumentStore::new(
                config.database.url.expose_secret(),
                config.database.max_connections,
                config.database.min_connections,
            )
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("{}", e)))?,
        );
        store
            .run_migrations()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("{}", e)))?;

        let store: Arc<dyn DocumentStore> = store;

        let authority: Arc<dyn AuthorityClient> = Arc::new(
            PacClient::new(config.authority.clone()).map_err(AppError::ConfigError)?,
        );

        let invoices = Arc::new(
            HttpInvoiceProvider::new(&config.collaborators).map_err(AppError::ConfigError)?,
        );
        let tax_profiles = Arc::new(
            HttpTaxProfileProvider::new(&config.collaborators).map_err(AppError::ConfigError)?,
        );
        let mut payloads = PayloadBuilder::new(invoices, tax_profiles);
        if let (Some(base_url), Some(template_id)) = (
            config.collaborators.attachment_base_url.clone(),
            config.collaborators.attachment_template_id.clone(),
        ) {
            let renderer = Arc::new(
                HttpAttachmentRenderer::new(base_url, config.collaborators.timeout_secs)
                    .map_err(AppError::ConfigError)?,
            );
            payloads = payloads.with_attachments(renderer, template_id);
        }
        if let Some(base_url) = config.collaborators.folio_base_url.clone() {
            let folios = Arc::new(
                HttpFolioAllocator::new(base_url, config.collaborators.timeout_secs)
                    .map_err(AppError::ConfigError)?,
            );
            payloads = payloads.with_folio_allocator(folios);
        }

        let guard = SubmissionGuard::new(Duration::from_secs(config.stamping.guard_ttl_secs));
        let validator = DocumentValidator::new(ValidationConfig {
            sentinel_payment_form: config.stamping.sentinel_payment_form.clone(),
        });
        let reconciliation = Arc::new(ReconciliationService::new(
            store.clone(),
            authority.clone(),
            ReconciliationConfig {
                max_polls: config.reconciliation.max_polls,
                initial_backoff: Duration::from_millis(config.reconciliation.initial_backoff_ms),
                max_backoff: Duration::from_millis(config.reconciliation.max_backoff_ms),
            },
        ));

        let stamping = StampingOrchestrator::new(
            store.clone(),
            authority.clone(),
            guard,
            payloads,
            validator,
            reconciliation.clone(),
        );
        let cancellation = CancellationOrchestrator::new(store.clone(), authority.clone());
        let lifecycle = Arc::new(LifecycleService::new(store.clone(), stamping, cancellation));

        init_metrics();

        let state = AppState {
            config: config.clone(),
            lifecycle,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            .route("/documents", post(handlers::documents::create_document))
            .route("/documents/:id", get(handlers::documents::get_document))
            .route(
                "/documents/:id/stamp",
                post(handlers::documents::stamp_document),
            )
            .route(
                "/documents/:id/cancel",
                post(handlers::documents::cancel_document),
            )
            .route(
                "/documents/:id/log",
                get(handlers::documents::get_document_log),
            )
            .route(
                "/documents/:id/archive",
                post(handlers::documents::archive_document),
            )
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
            .with_state(state);

        // Bind (port 0 = random port for testing).
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Stamping service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
            reconciliation,
            sweep_interval: Duration::from_secs(config.stamping.sweep_interval_secs),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    ///
    /// Serves the HTTP API and runs the periodic reconciliation sweep that
    /// settles documents whose authority call never resolved.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let reconciliation = self.reconciliation.clone();
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // The first tick fires immediately; skip it so the sweep starts
            // one interval after boot.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = reconciliation.sweep().await {
                    tracing::warn!("Reconciliation sweep failed: {}", e);
                }
            }
        });

        axum::serve(self.listener, self.router).await
    }
}
