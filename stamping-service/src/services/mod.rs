//! Services for stamping-service.

pub mod authority;
pub mod cancellation;
pub mod database;
pub mod guard;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod pac;
pub mod reconciliation;
pub mod response_log;
pub mod stamping;
pub mod state_machine;
pub mod store;
pub mod validation;

pub use authority::AuthorityClient;
pub use cancellation::CancellationOrchestrator;
pub use database::PgDocumentStore;
pub use guard::SubmissionGuard;
pub use lifecycle::LifecycleService;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use pac::PacClient;
pub use reconciliation::{ReconciliationService, ReconciliationConfig};
pub use response_log::ResponseLog;
pub use stamping::StampingOrchestrator;
pub use state_machine::TransitionValidator;
pub use store::DocumentStore;
pub use validation::{DocumentValidator, ValidationConfig};
