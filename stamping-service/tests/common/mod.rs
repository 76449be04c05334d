//! Shared test fixtures: a scripted authority client, stub collaborators and
//! a fully wired lifecycle service over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stamping_service::models::{FiscalDocument, NewDocument, PaymentMethod};
use stamping_service::providers::{
    Folio, FolioAllocator, InvoiceDataProvider, InvoiceLine, InvoiceTotals, PayloadBuilder,
    ProviderError, TaxProfile, TaxProfileProvider,
};
use stamping_service::services::authority::{
    AuthorityClient, AuthorityState, CancelOutcome, CancelRequest, CancelResponse, QueryOutcome,
    QueryResponse, StampOutcome, StampPayload, StampResponse,
};
use stamping_service::services::{
    CancellationOrchestrator, DocumentStore, DocumentValidator, InMemoryStore, LifecycleService,
    ReconciliationConfig, ReconciliationService, StampingOrchestrator, SubmissionGuard,
    ValidationConfig,
};

pub const TEST_INVOICE: &str = "INV-0001";

/// Scripted authority client. Responses are consumed in push order; when a
/// queue runs dry the client falls back to a benign default so unrelated
/// tests stay short.
#[derive(Default)]
pub struct MockAuthority {
    stamp_responses: Mutex<VecDeque<StampResponse>>,
    cancel_responses: Mutex<VecDeque<CancelResponse>>,
    query_responses: Mutex<VecDeque<QueryResponse>>,
    stamp_delay_ms: AtomicU64,
    pub stamp_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl MockAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay every stamp call, so concurrent submissions overlap.
    pub fn set_stamp_delay(&self, delay: Duration) {
        self.stamp_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn push_stamp(&self, response: StampResponse) {
        self.stamp_responses.lock().unwrap().push_back(response);
    }

    pub fn push_cancel(&self, response: CancelResponse) {
        self.cancel_responses.lock().unwrap().push_back(response);
    }

    pub fn push_query(&self, response: QueryResponse) {
        self.query_responses.lock().unwrap().push_back(response);
    }
}

pub fn stamp_success(uuid: &str) -> StampResponse {
    StampResponse {
        outcome: StampOutcome::Success {
            uuid: uuid.to_string(),
            series: Some("A".to_string()),
            number: Some("100".to_string()),
        },
        status_code: Some(200),
        raw: format!(r#"{{"uuid":"{}"}}"#, uuid),
    }
}

pub fn stamp_rejected(code: &str, message: &str) -> StampResponse {
    StampResponse {
        outcome: StampOutcome::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        },
        status_code: Some(422),
        raw: format!(r#"{{"code":"{}","message":"{}"}}"#, code, message),
    }
}

pub fn stamp_ambiguous(reason: &str) -> StampResponse {
    StampResponse {
        outcome: StampOutcome::Ambiguous {
            reason: reason.to_string(),
        },
        status_code: None,
        raw: String::new(),
    }
}

pub fn cancel_accepted() -> CancelResponse {
    CancelResponse {
        outcome: CancelOutcome::Accepted,
        status_code: Some(200),
        raw: r#"{"status":"accepted"}"#.to_string(),
    }
}

pub fn cancel_pending() -> CancelResponse {
    CancelResponse {
        outcome: CancelOutcome::Pending,
        status_code: Some(202),
        raw: r#"{"status":"in_progress"}"#.to_string(),
    }
}

pub fn cancel_rejected(code: &str, message: &str) -> CancelResponse {
    CancelResponse {
        outcome: CancelOutcome::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        },
        status_code: Some(409),
        raw: format!(r#"{{"code":"{}","message":"{}"}}"#, code, message),
    }
}

pub fn query_found(uuid: &str, state: AuthorityState) -> QueryResponse {
    QueryResponse {
        outcome: QueryOutcome::Found {
            uuid: uuid.to_string(),
            state,
        },
        status_code: Some(200),
        raw: format!(r#"{{"found":true,"uuid":"{}"}}"#, uuid),
    }
}

pub fn query_not_found() -> QueryResponse {
    QueryResponse {
        outcome: QueryOutcome::NotFound,
        status_code: Some(404),
        raw: r#"{"found":false}"#.to_string(),
    }
}

#[async_trait]
impl AuthorityClient for MockAuthority {
    async fn stamp(&self, _payload: &StampPayload, _idempotency_key: &str) -> StampResponse {
        let call = self.stamp_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.stamp_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.stamp_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| stamp_success(&format!("UUID-DEFAULT-{}", call)))
    }

    async fn cancel(&self, _request: &CancelRequest) -> CancelResponse {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(cancel_accepted)
    }

    async fn query_status(&self, _key: &str) -> QueryResponse {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.query_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(query_not_found)
    }
}

pub struct StubInvoices;

#[async_trait]
impl InvoiceDataProvider for StubInvoices {
    async fn invoice_totals(
        &self,
        _source_invoice_ref: &str,
    ) -> Result<InvoiceTotals, ProviderError> {
        Ok(InvoiceTotals {
            lines: vec![InvoiceLine {
                description: "Consulting services".to_string(),
                quantity: Decimal::ONE,
                unit_price: Decimal::new(10000, 2),
                amount: Decimal::new(10000, 2),
            }],
            total: Decimal::new(11600, 2),
            customer_ref: "CUST-1".to_string(),
        })
    }
}

pub struct StubTaxProfiles;

#[async_trait]
impl TaxProfileProvider for StubTaxProfiles {
    async fn tax_profile(&self, _customer_ref: &str) -> Result<TaxProfile, ProviderError> {
        Ok(TaxProfile {
            tax_id: "XAXX010101000".to_string(),
            tax_regime: "601".to_string(),
            default_tax_use_code: "G03".to_string(),
        })
    }
}

/// Sequential folio allocation, one series per branch.
#[derive(Default)]
pub struct StubFolios {
    next: AtomicU64,
}

#[async_trait]
impl FolioAllocator for StubFolios {
    async fn next_folio(&self, branch_ref: &str) -> Result<Folio, ProviderError> {
        let number = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Folio {
            series: branch_ref.to_string(),
            number: number.to_string(),
        })
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub authority: Arc<MockAuthority>,
    pub lifecycle: Arc<LifecycleService>,
}

impl TestApp {
    pub fn spawn(authority: Arc<MockAuthority>) -> Self {
        Self::spawn_with(authority, false)
    }

    pub fn spawn_with_folios(authority: Arc<MockAuthority>) -> Self {
        Self::spawn_with(authority, true)
    }

    fn spawn_with(authority: Arc<MockAuthority>, with_folios: bool) -> Self {
        let concrete = Arc::new(InMemoryStore::new());
        let store: Arc<dyn DocumentStore> = concrete.clone();

        let mut payloads = PayloadBuilder::new(Arc::new(StubInvoices), Arc::new(StubTaxProfiles));
        if with_folios {
            payloads = payloads.with_folio_allocator(Arc::new(StubFolios::default()));
        }

        let guard = SubmissionGuard::new(Duration::from_secs(60));
        let validator = DocumentValidator::new(ValidationConfig::default());
        let reconciliation = Arc::new(ReconciliationService::new(
            store.clone(),
            authority.clone() as Arc<dyn AuthorityClient>,
            ReconciliationConfig {
                max_polls: 3,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(10),
            },
        ));

        let stamping = StampingOrchestrator::new(
            store.clone(),
            authority.clone() as Arc<dyn AuthorityClient>,
            guard,
            payloads,
            validator,
            reconciliation,
        );
        let cancellation = CancellationOrchestrator::new(
            store.clone(),
            authority.clone() as Arc<dyn AuthorityClient>,
        );
        let lifecycle = Arc::new(LifecycleService::new(store.clone(), stamping, cancellation));

        Self {
            store: concrete,
            authority,
            lifecycle,
        }
    }

    pub fn reconciliation(&self) -> Arc<ReconciliationService> {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        Arc::new(ReconciliationService::new(
            store,
            self.authority.clone() as Arc<dyn AuthorityClient>,
            ReconciliationConfig {
                max_polls: 3,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(10),
            },
        ))
    }
}

pub fn new_document(invoice: &str) -> NewDocument {
    NewDocument {
        source_invoice_ref: invoice.to_string(),
        branch_ref: None,
        payment_method: PaymentMethod::SinglePayment,
        payment_form_code: "03".to_string(),
        tax_use_code: "G03".to_string(),
    }
}

/// Create a draft document for `invoice` with valid fiscal fields.
pub async fn create_draft(app: &TestApp, invoice: &str) -> FiscalDocument {
    app.lifecycle
        .create_document(new_document(invoice))
        .await
        .expect("Failed to create draft document")
}
