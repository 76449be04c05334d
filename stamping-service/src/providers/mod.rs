//! Collaborator contracts consumed by the stamping orchestrator.
//!
//! Invoice data, tax profiles, trading-partner attachments and folio
//! allocation are owned by other systems; the orchestrator only depends on
//! these black-box interfaces.

pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::FiscalDocument;
use crate::services::authority::StampPayload;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{entity} not found: {reference}")]
    NotFound {
        entity: &'static str,
        reference: String,
    },

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// One invoice line as reported by the invoice owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// Totals of the commercial invoice a fiscal document certifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub lines: Vec<InvoiceLine>,
    pub total: Decimal,
    pub customer_ref: String,
}

/// Fiscal identity of the invoice's customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxProfile {
    pub tax_id: String,
    pub tax_regime: String,
    pub default_tax_use_code: String,
}

/// Series/number pair allocated for a branch.
#[derive(Debug, Clone, Deserialize)]
pub struct Folio {
    pub series: String,
    pub number: String,
}

#[async_trait]
pub trait InvoiceDataProvider: Send + Sync {
    async fn invoice_totals(&self, source_invoice_ref: &str)
        -> Result<InvoiceTotals, ProviderError>;
}

#[async_trait]
pub trait TaxProfileProvider: Send + Sync {
    async fn tax_profile(&self, customer_ref: &str) -> Result<TaxProfile, ProviderError>;
}

#[async_trait]
pub trait AttachmentRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        context: &serde_json::Value,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait FolioAllocator: Send + Sync {
    async fn next_folio(&self, branch_ref: &str) -> Result<Folio, ProviderError>;
}

/// Assembles the document payload submitted to the authority from the
/// collaborator interfaces. Attachment rendering and folio allocation are
/// optional per deployment.
pub struct PayloadBuilder {
    invoices: Arc<dyn InvoiceDataProvider>,
    tax_profiles: Arc<dyn TaxProfileProvider>,
    attachments: Option<(Arc<dyn AttachmentRenderer>, String)>,
    folios: Option<Arc<dyn FolioAllocator>>,
}

impl PayloadBuilder {
    pub fn new(
        invoices: Arc<dyn InvoiceDataProvider>,
        tax_profiles: Arc<dyn TaxProfileProvider>,
    ) -> Self {
        Self {
            invoices,
            tax_profiles,
            attachments: None,
            folios: None,
        }
    }

    pub fn with_attachments(
        mut self,
        renderer: Arc<dyn AttachmentRenderer>,
        template_id: String,
    ) -> Self {
        self.attachments = Some((renderer, template_id));
        self
    }

    pub fn with_folio_allocator(mut self, folios: Arc<dyn FolioAllocator>) -> Self {
        self.folios = Some(folios);
        self
    }

    pub async fn build(&self, doc: &FiscalDocument) -> Result<StampPayload, ProviderError> {
        let totals = self.invoices.invoice_totals(&doc.source_invoice_ref).await?;
        let profile = self.tax_profiles.tax_profile(&totals.customer_ref).await?;

        // Folio is consumed before stamping when the deployment numbers per
        // branch; the committed series/number still come from the authority
        // response, with the allocation as fallback.
        let folio = match (&self.folios, &doc.branch_ref) {
            (Some(allocator), Some(branch_ref)) => Some(allocator.next_folio(branch_ref).await?),
            _ => None,
        };

        let attachment_xml = match &self.attachments {
            Some((renderer, template_id)) => {
                let context = serde_json::json!({
                    "source_invoice_ref": doc.source_invoice_ref,
                    "customer_ref": totals.customer_ref,
                    "total": totals.total,
                    "tax_id": profile.tax_id,
                });
                Some(renderer.render(template_id, &context).await?)
            }
            None => None,
        };

        Ok(StampPayload {
            document_id: doc.id,
            source_invoice_ref: doc.source_invoice_ref.clone(),
            series: folio.as_ref().map(|f| f.series.clone()),
            number: folio.as_ref().map(|f| f.number.clone()),
            payment_method: doc.payment_method,
            payment_form_code: doc.payment_form_code.clone(),
            tax_use_code: doc.tax_use_code.clone(),
            customer_ref: totals.customer_ref.clone(),
            customer_tax_id: profile.tax_id,
            customer_tax_regime: profile.tax_regime,
            lines: totals.lines,
            total: totals.total,
            attachment_xml,
        })
    }
}
