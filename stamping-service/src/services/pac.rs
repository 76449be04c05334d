//! HTTP client for the certification authority (PAC).
//!
//! Maps the authority's REST API onto the normalized `AuthorityClient`
//! contract. Classification is deliberately conservative: anything that
//! leaves the stamp outcome unknown (timeout, connection loss, 5xx,
//! unparseable success body) is AMBIGUOUS, never a rejection.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AuthorityConfig;
use crate::services::authority::{
    AuthorityClient, AuthorityState, CancelOutcome, CancelRequest, CancelResponse, QueryOutcome,
    QueryResponse, StampOutcome, StampPayload, StampResponse,
};
use crate::services::metrics::AUTHORITY_CALL_DURATION;

#[derive(Clone)]
pub struct PacClient {
    client: Client,
    config: AuthorityConfig,
}

/// Successful stamp body.
#[derive(Debug, Deserialize)]
struct PacStampBody {
    uuid: String,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    number: Option<String>,
}

/// Authority error body, shared by stamp and cancel rejections.
#[derive(Debug, Deserialize)]
struct PacErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PacCancelBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PacQueryBody {
    found: bool,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
struct PacCancelRequestBody<'a> {
    uuid: &'a str,
    motive: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    substitution_uuid: Option<&'a str>,
}

impl PacClient {
    pub fn new(config: AuthorityConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn parse_error_body(body: &str) -> PacErrorBody {
        serde_json::from_str(body).unwrap_or_else(|_| PacErrorBody {
            code: "UNKNOWN".to_string(),
            message: body.to_string(),
        })
    }

    fn map_stamp_response(status: StatusCode, body: String) -> StampResponse {
        let status_code = Some(status.as_u16() as i32);
        let outcome = if status.is_success() {
            match serde_json::from_str::<PacStampBody>(&body) {
                Ok(stamp) => StampOutcome::Success {
                    uuid: stamp.uuid,
                    series: stamp.series,
                    number: stamp.number,
                },
                // A 2xx we cannot parse may still have committed the stamp.
                Err(err) => StampOutcome::Ambiguous {
                    reason: format!("unparseable success response: {}", err),
                },
            }
        } else if status.is_client_error() {
            let error = Self::parse_error_body(&body);
            StampOutcome::Rejected {
                code: error.code,
                message: error.message,
            }
        } else {
            StampOutcome::Ambiguous {
                reason: format!("authority returned {}", status),
            }
        };

        StampResponse {
            outcome,
            status_code,
            raw: body,
        }
    }

    fn map_cancel_response(status: StatusCode, body: String) -> CancelResponse {
        let status_code = Some(status.as_u16() as i32);
        let outcome = if status.is_success() {
            match serde_json::from_str::<PacCancelBody>(&body) {
                Ok(cancel) if cancel.status.eq_ignore_ascii_case("accepted") => {
                    CancelOutcome::Accepted
                }
                // "pending", "in_progress" and anything unrecognized: the
                // request is in, a later status query settles it.
                _ => CancelOutcome::Pending,
            }
        } else if status.is_client_error() {
            let error = Self::parse_error_body(&body);
            CancelOutcome::Rejected {
                code: error.code,
                message: error.message,
            }
        } else {
            CancelOutcome::Pending
        };

        CancelResponse {
            outcome,
            status_code,
            raw: body,
        }
    }

    fn map_query_response(status: StatusCode, body: String) -> QueryResponse {
        let status_code = Some(status.as_u16() as i32);
        let outcome = if status == StatusCode::NOT_FOUND {
            QueryOutcome::NotFound
        } else if status.is_success() {
            match serde_json::from_str::<PacQueryBody>(&body) {
                Ok(query) => match (query.found, query.uuid) {
                    (true, Some(uuid)) => {
                        let state = match query.state.as_deref() {
                            Some(s) if s.eq_ignore_ascii_case("cancelled") => {
                                AuthorityState::Cancelled
                            }
                            _ => AuthorityState::Active,
                        };
                        QueryOutcome::Found { uuid, state }
                    }
                    _ => QueryOutcome::NotFound,
                },
                Err(err) => QueryOutcome::Unavailable {
                    reason: format!("unparseable query response: {}", err),
                },
            }
        } else {
            QueryOutcome::Unavailable {
                reason: format!("authority returned {}", status),
            }
        };

        QueryResponse {
            outcome,
            status_code,
            raw: body,
        }
    }
}

#[async_trait]
impl AuthorityClient for PacClient {
    async fn stamp(&self, payload: &StampPayload, idempotency_key: &str) -> StampResponse {
        let url = format!("{}/stamps", self.config.base_url);
        let timer = AUTHORITY_CALL_DURATION
            .with_label_values(&["stamp"])
            .start_timer();

        let result = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .header("Idempotency-Key", idempotency_key)
            .json(payload)
            .send()
            .await;

        timer.observe_duration();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "Stamp call failed in transport");
                return StampResponse {
                    outcome: StampOutcome::Ambiguous {
                        reason: classify_transport_error(&err),
                    },
                    status_code: None,
                    raw: String::new(),
                };
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => {
                tracing::debug!(status = %status, body = %body, "Stamp response");
                Self::map_stamp_response(status, body)
            }
            Err(err) => StampResponse {
                outcome: StampOutcome::Ambiguous {
                    reason: format!("response body lost: {}", err),
                },
                status_code: Some(status.as_u16() as i32),
                raw: String::new(),
            },
        }
    }

    async fn cancel(&self, request: &CancelRequest) -> CancelResponse {
        let url = format!("{}/cancellations", self.config.base_url);
        let body = PacCancelRequestBody {
            uuid: &request.authority_uuid,
            motive: request.motive.code(),
            substitution_uuid: request.substitution_uuid.as_deref(),
        };
        let timer = AUTHORITY_CALL_DURATION
            .with_label_values(&["cancel"])
            .start_timer();

        let result = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .json(&body)
            .send()
            .await;

        timer.observe_duration();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "Cancel call failed in transport");
                // The request may have reached the authority; treat as
                // pending and let the status query settle it.
                return CancelResponse {
                    outcome: CancelOutcome::Pending,
                    status_code: None,
                    raw: classify_transport_error(&err),
                };
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => {
                tracing::debug!(status = %status, body = %body, "Cancel response");
                Self::map_cancel_response(status, body)
            }
            Err(err) => CancelResponse {
                outcome: CancelOutcome::Pending,
                status_code: Some(status.as_u16() as i32),
                raw: format!("response body lost: {}", err),
            },
        }
    }

    async fn query_status(&self, key: &str) -> QueryResponse {
        let url = format!("{}/stamps/{}", self.config.base_url, key);
        let timer = AUTHORITY_CALL_DURATION
            .with_label_values(&["query_status"])
            .start_timer();

        let result = self
            .client
            .get(&url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .send()
            .await;

        timer.observe_duration();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                return QueryResponse {
                    outcome: QueryOutcome::Unavailable {
                        reason: classify_transport_error(&err),
                    },
                    status_code: None,
                    raw: String::new(),
                };
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => Self::map_query_response(status, body),
            Err(err) => QueryResponse {
                outcome: QueryOutcome::Unavailable {
                    reason: format!("response body lost: {}", err),
                },
                status_code: Some(status.as_u16() as i32),
                raw: String::new(),
            },
        }
    }
}

fn classify_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "authority call timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("transport failure: {}", err)
    }
}
