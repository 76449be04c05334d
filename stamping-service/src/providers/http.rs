//! HTTP clients for the collaborator services.
//!
//! Thin typed clients over the invoice, tax-profile, attachment and folio
//! services. Each call is bounded by the shared client timeout; failures are
//! reported as `ProviderError` and never as raw transport errors.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{
    AttachmentRenderer, Folio, FolioAllocator, InvoiceDataProvider, InvoiceTotals, ProviderError,
    TaxProfile, TaxProfileProvider,
};
use crate::config::CollaboratorsConfig;

fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

#[derive(Clone)]
pub struct HttpInvoiceProvider {
    client: Client,
    base_url: String,
}

impl HttpInvoiceProvider {
    pub fn new(config: &CollaboratorsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.invoice_base_url.clone(),
        })
    }
}

#[async_trait]
impl InvoiceDataProvider for HttpInvoiceProvider {
    async fn invoice_totals(
        &self,
        source_invoice_ref: &str,
    ) -> Result<InvoiceTotals, ProviderError> {
        let url = format!("{}/invoices/{}/totals", self.base_url, source_invoice_ref);
        let response = self.client.get(&url).send().await.map_err(transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                entity: "invoice",
                reference: source_invoice_ref.to_string(),
            });
        }
        let response = response.error_for_status().map_err(transport)?;
        response.json::<InvoiceTotals>().await.map_err(transport)
    }
}

#[derive(Clone)]
pub struct HttpTaxProfileProvider {
    client: Client,
    base_url: String,
}

impl HttpTaxProfileProvider {
    pub fn new(config: &CollaboratorsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.tax_profile_base_url.clone(),
        })
    }
}

#[async_trait]
impl TaxProfileProvider for HttpTaxProfileProvider {
    async fn tax_profile(&self, customer_ref: &str) -> Result<TaxProfile, ProviderError> {
        let url = format!("{}/customers/{}/tax-profile", self.base_url, customer_ref);
        let response = self.client.get(&url).send().await.map_err(transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                entity: "tax profile",
                reference: customer_ref.to_string(),
            });
        }
        let response = response.error_for_status().map_err(transport)?;
        response.json::<TaxProfile>().await.map_err(transport)
    }
}

#[derive(Clone)]
pub struct HttpAttachmentRenderer {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    template_id: &'a str,
    context: &'a serde_json::Value,
}

impl HttpAttachmentRenderer {
    pub fn new(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url,
        })
    }
}

#[async_trait]
impl AttachmentRenderer for HttpAttachmentRenderer {
    async fn render(
        &self,
        template_id: &str,
        context: &serde_json::Value,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/render", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RenderRequest {
                template_id,
                context,
            })
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        response.text().await.map_err(transport)
    }
}

#[derive(Clone)]
pub struct HttpFolioAllocator {
    client: Client,
    base_url: String,
}

impl HttpFolioAllocator {
    pub fn new(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url,
        })
    }
}

#[async_trait]
impl FolioAllocator for HttpFolioAllocator {
    async fn next_folio(&self, branch_ref: &str) -> Result<Folio, ProviderError> {
        let url = format!("{}/branches/{}/folios", self.base_url, branch_ref);
        let response = self.client.post(&url).send().await.map_err(transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                entity: "branch",
                reference: branch_ref.to_string(),
            });
        }
        let response = response.error_for_status().map_err(transport)?;
        response.json::<Folio>().await.map_err(transport)
    }
}
