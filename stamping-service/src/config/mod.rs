use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub authority: AuthorityConfig,
    pub collaborators: CollaboratorsConfig,
    pub stamping: StampingConfig,
    pub reconciliation: ReconciliationConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Credentials and endpoint of the external certification authority (PAC).
#[derive(Deserialize, Clone, Debug)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub username: String,
    pub password: Secret<String>,
    /// Hard bound on every authority call; after it elapses the outcome is
    /// ambiguous and reconciliation takes over.
    pub timeout_secs: u64,
}

/// Endpoints of the collaborator services.
#[derive(Deserialize, Clone, Debug)]
pub struct CollaboratorsConfig {
    pub invoice_base_url: String,
    pub tax_profile_base_url: String,
    pub attachment_base_url: Option<String>,
    pub attachment_template_id: Option<String>,
    pub folio_base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Stamping behavior. Passed explicitly to the components at construction;
/// nothing reads process-wide flags.
#[derive(Deserialize, Clone, Debug)]
pub struct StampingConfig {
    /// Submission guard slot lifetime; covers an authority call plus
    /// reconciliation before a crashed holder's slot can be taken over.
    pub guard_ttl_secs: u64,
    /// Interval of the background sweep that re-drives documents with an
    /// outstanding authority call.
    pub sweep_interval_secs: u64,
    /// The "to be defined" payment-form code required for deferred payments.
    pub sentinel_payment_form: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ReconciliationConfig {
    pub max_polls: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("STAMPING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("STAMPING_SERVICE_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()?;

        let db_url = env::var("STAMPING_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("STAMPING_DATABASE_URL must be set"))?;

        let authority = AuthorityConfig {
            base_url: env::var("STAMPING_AUTHORITY_URL")
                .map_err(|_| anyhow::anyhow!("STAMPING_AUTHORITY_URL must be set"))?,
            username: env::var("STAMPING_AUTHORITY_USER").unwrap_or_default(),
            password: Secret::new(env::var("STAMPING_AUTHORITY_PASSWORD").unwrap_or_default()),
            timeout_secs: env_u64("STAMPING_AUTHORITY_TIMEOUT_SECS", 30)?,
        };

        let collaborators = CollaboratorsConfig {
            invoice_base_url: env::var("STAMPING_INVOICE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            tax_profile_base_url: env::var("STAMPING_TAX_PROFILE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3002".to_string()),
            attachment_base_url: env::var("STAMPING_ATTACHMENT_SERVICE_URL").ok(),
            attachment_template_id: env::var("STAMPING_ATTACHMENT_TEMPLATE_ID").ok(),
            folio_base_url: env::var("STAMPING_FOLIO_SERVICE_URL").ok(),
            timeout_secs: env_u64("STAMPING_COLLABORATOR_TIMEOUT_SECS", 10)?,
        };

        let stamping = StampingConfig {
            guard_ttl_secs: env_u64("STAMPING_GUARD_TTL_SECS", 120)?,
            sweep_interval_secs: env_u64("STAMPING_SWEEP_INTERVAL_SECS", 300)?,
            sentinel_payment_form: env::var("STAMPING_SENTINEL_PAYMENT_FORM")
                .unwrap_or_else(|_| "99".to_string()),
        };

        let reconciliation = ReconciliationConfig {
            max_polls: env::var("STAMPING_RECONCILE_MAX_POLLS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            initial_backoff_ms: env_u64("STAMPING_RECONCILE_INITIAL_BACKOFF_MS", 2000)?,
            max_backoff_ms: env_u64("STAMPING_RECONCILE_MAX_BACKOFF_MS", 30000)?,
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections: env::var("STAMPING_DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("STAMPING_DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            authority,
            collaborators,
            stamping,
            reconciliation,
            service_name: "stamping-service".to_string(),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
