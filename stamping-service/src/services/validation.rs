//! Pre-flight fiscal field validation.
//!
//! Runs before any transition into PROCESSING and before any external call.
//! All behavior comes from the configuration handed in at construction;
//! nothing reads process-wide state.

use thiserror::Error;

use crate::models::{FiscalDocument, PaymentMethod};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationFailure(pub String);

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Payment-form code meaning "to be defined"; legally required for
    /// deferred payments and forbidden for single payments.
    pub sentinel_payment_form: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sentinel_payment_form: "99".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DocumentValidator {
    config: ValidationConfig,
}

impl DocumentValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Check the fiscal fields a stamp submission legally requires.
    pub fn validate_for_stamping(&self, doc: &FiscalDocument) -> Result<(), ValidationFailure> {
        if doc.source_invoice_ref.trim().is_empty() {
            return Err(ValidationFailure(
                "source invoice reference must not be empty".to_string(),
            ));
        }
        if doc.tax_use_code.trim().is_empty() {
            return Err(ValidationFailure(
                "tax use code must not be empty".to_string(),
            ));
        }
        if doc.payment_form_code.trim().is_empty() {
            return Err(ValidationFailure(
                "payment form code must not be empty".to_string(),
            ));
        }

        let sentinel = &self.config.sentinel_payment_form;
        match doc.payment_method {
            PaymentMethod::SinglePayment => {
                if doc.payment_form_code == *sentinel {
                    return Err(ValidationFailure(format!(
                        "single payment requires a concrete payment form, not the \"{}\" sentinel",
                        sentinel
                    )));
                }
            }
            PaymentMethod::DeferredPayment => {
                if doc.payment_form_code != *sentinel {
                    return Err(ValidationFailure(format!(
                        "deferred payment requires the \"{}\" payment form, got \"{}\"",
                        sentinel, doc.payment_form_code
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDocument;

    fn doc(method: PaymentMethod, form: &str, tax_use: &str) -> FiscalDocument {
        FiscalDocument::draft(NewDocument {
            source_invoice_ref: "INV-0001".to_string(),
            branch_ref: None,
            payment_method: method,
            payment_form_code: form.to_string(),
            tax_use_code: tax_use.to_string(),
        })
    }

    #[test]
    fn single_payment_with_concrete_form_passes() {
        let validator = DocumentValidator::new(ValidationConfig::default());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::SinglePayment, "03", "G03"))
            .is_ok());
    }

    #[test]
    fn single_payment_with_sentinel_fails() {
        let validator = DocumentValidator::new(ValidationConfig::default());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::SinglePayment, "99", "G03"))
            .is_err());
    }

    #[test]
    fn deferred_payment_requires_sentinel() {
        let validator = DocumentValidator::new(ValidationConfig::default());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::DeferredPayment, "99", "G03"))
            .is_ok());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::DeferredPayment, "03", "G03"))
            .is_err());
    }

    #[test]
    fn empty_tax_use_code_fails() {
        let validator = DocumentValidator::new(ValidationConfig::default());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::SinglePayment, "03", ""))
            .is_err());
    }

    #[test]
    fn sentinel_is_configuration_not_a_constant() {
        let validator = DocumentValidator::new(ValidationConfig {
            sentinel_payment_form: "TBD".to_string(),
        });
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::DeferredPayment, "TBD", "G03"))
            .is_ok());
        assert!(validator
            .validate_for_stamping(&doc(PaymentMethod::DeferredPayment, "99", "G03"))
            .is_err());
    }
}
