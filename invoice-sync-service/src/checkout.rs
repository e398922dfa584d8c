//! Checkout validation of the company billing fields.
//!
//! Field names match the order metadata keys the tax-id lookup reads later.

use crate::settings::Settings;
use crate::vies::{VatCheck, ViesClient};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyFields {
    /// Customer ticked "buying as a company"; nothing is checked otherwise.
    #[serde(default, rename = "wi_as_company")]
    pub as_company: bool,
    #[serde(default, rename = "billing_company")]
    pub name: String,
    #[serde(default, rename = "billing_company_wi_id")]
    pub company_id: String,
    #[serde(default, rename = "billing_company_wi_vat")]
    pub vat_id: String,
    #[serde(default, rename = "billing_company_wi_tax")]
    pub tax_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyFieldsCheck {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Outcome of the VIES lookup when one was made.
    pub vat_check: Option<VatCheck>,
}

fn required(settings: &Settings, field: &str) -> bool {
    settings.get_or(&format!("add_company_billing_fields_{}", field), "optional") == "required"
}

fn missing(label: &str) -> String {
    format!("{} is a required field.", label)
}

pub async fn validate_company_fields(
    fields: &CompanyFields,
    settings: &Settings,
    vies: &ViesClient,
) -> CompanyFieldsCheck {
    let mut errors = Vec::new();
    let mut vat_check = None;

    if fields.as_company {
        if required(settings, "name") && fields.name.trim().is_empty() {
            errors.push(missing("Company name"));
        }
        if required(settings, "id") && fields.company_id.trim().is_empty() {
            errors.push(missing("ID #"));
        }

        let vat_id = fields.vat_id.trim();
        if vat_id.is_empty() {
            if required(settings, "vat") {
                errors.push(missing("VAT #"));
            }
        } else if settings.is_yes("validate_eu_vat_number", false) {
            let check = vies.validate(vat_id).await;
            match check {
                VatCheck::Valid => {}
                VatCheck::Invalid => errors.push("VAT # is not valid.".to_string()),
                VatCheck::Unverified => errors.push("VAT # could not be validated.".to_string()),
            }
            vat_check = Some(check);
        }

        if required(settings, "tax") && fields.tax_id.trim().is_empty() {
            errors.push(missing("TAX ID #"));
        }
    }

    CompanyFieldsCheck {
        valid: errors.is_empty(),
        errors,
        vat_check,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::config::ViesConfig;
    use crate::services::MemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn vies() -> ViesClient {
        let config = ViesConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_secs(1),
        };
        ViesClient::new(&config, AuditLogger::new(Arc::new(MemoryBackend::new()))).unwrap()
    }

    #[tokio::test]
    async fn private_customers_are_not_checked() {
        let settings = Settings::from_pairs([("add_company_billing_fields_name", "required")]);

        let check = validate_company_fields(&CompanyFields::default(), &settings, &vies()).await;

        assert!(check.valid);
        assert!(check.errors.is_empty());
    }

    #[tokio::test]
    async fn required_company_fields_are_reported_in_order() {
        let settings = Settings::from_pairs([
            ("add_company_billing_fields_name", "required"),
            ("add_company_billing_fields_id", "optional"),
            ("add_company_billing_fields_vat", "required"),
            ("add_company_billing_fields_tax", "required"),
        ]);
        let fields = CompanyFields {
            as_company: true,
            company_id: String::new(),
            tax_id: "  ".into(),
            ..Default::default()
        };

        let check = validate_company_fields(&fields, &settings, &vies()).await;

        assert!(!check.valid);
        assert_eq!(
            check.errors,
            vec![
                "Company name is a required field.",
                "VAT # is a required field.",
                "TAX ID # is a required field.",
            ]
        );
        assert_eq!(check.vat_check, None);
    }

    #[tokio::test]
    async fn vat_number_is_not_looked_up_unless_enabled() {
        let fields = CompanyFields {
            as_company: true,
            vat_id: "SK2020123456".into(),
            ..Default::default()
        };

        let check = validate_company_fields(&fields, &Settings::default(), &vies()).await;

        assert!(check.valid);
        assert_eq!(check.vat_check, None);
    }
}
