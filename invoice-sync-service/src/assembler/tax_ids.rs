//! Client tax identifier providers.
//!
//! The company-details source always runs first. When it yields no VAT id,
//! the VAT integrations are asked in priority order and the first one that
//! produces a VAT id wins.

use crate::models::Order;
use crate::settings::Settings;

/// Business id (ICO), tax id (DIC) and VAT id (IC DPH) of the buyer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxIdentifiers {
    pub ico: Option<String>,
    pub dic: Option<String>,
    pub ic_dph: Option<String>,
}

impl TaxIdentifiers {
    pub fn has_vat_id(&self) -> bool {
        self.ic_dph.is_some()
    }
}

pub trait TaxIdProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifiers found on the order, or `None` when this source does not
    /// apply to it.
    fn extract(&self, order: &Order, settings: &Settings) -> Option<TaxIdentifiers>;
}

fn meta(order: &Order, key: &str) -> Option<String> {
    order.meta(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Company fields captured at checkout.
pub struct CompanyDetails;

impl TaxIdProvider for CompanyDetails {
    fn name(&self) -> &'static str {
        "company_details"
    }

    fn extract(&self, order: &Order, settings: &Settings) -> Option<TaxIdentifiers> {
        let (ico, vat, tax) = if settings.is_yes("company_details_integration", false) {
            (
                "_billing_company_id",
                "_billing_company_vat_id",
                "_billing_company_tax_id",
            )
        } else {
            (
                "billing_company_wi_id",
                "billing_company_wi_vat",
                "billing_company_wi_tax",
            )
        };
        Some(TaxIdentifiers {
            ico: meta(order, ico),
            dic: meta(order, tax),
            ic_dph: meta(order, vat),
        })
    }
}

/// Validated EU VAT number from the checkout VAT validator.
pub struct EuVatNumber;

impl TaxIdProvider for EuVatNumber {
    fn name(&self) -> &'static str {
        "eu_vat_number"
    }

    fn extract(&self, order: &Order, _settings: &Settings) -> Option<TaxIdentifiers> {
        if order.meta("_vat_number_is_valid") != Some("true") {
            return None;
        }
        let vat = meta(order, "_vat_number").or_else(|| meta(order, "_billing_vat_number"));
        Some(TaxIdentifiers {
            ic_dph: vat,
            ..Default::default()
        })
    }
}

pub struct EuVatAssistant;

impl TaxIdProvider for EuVatAssistant {
    fn name(&self) -> &'static str {
        "eu_vat_assistant"
    }

    fn extract(&self, order: &Order, _settings: &Settings) -> Option<TaxIdentifiers> {
        if order.meta("_vat_number_validated") != Some("valid") {
            return None;
        }
        Some(TaxIdentifiers {
            ic_dph: meta(order, "vat_number"),
            ..Default::default()
        })
    }
}

pub struct EuVatCompliance;

impl TaxIdProvider for EuVatCompliance {
    fn name(&self) -> &'static str {
        "eu_vat_compliance"
    }

    fn extract(&self, order: &Order, _settings: &Settings) -> Option<TaxIdentifiers> {
        if order.meta("VAT number validated") != Some("true") {
            return None;
        }
        Some(TaxIdentifiers {
            ic_dph: meta(order, "VAT Number"),
            ..Default::default()
        })
    }
}

pub struct EuVatManager;

impl TaxIdProvider for EuVatManager {
    fn name(&self) -> &'static str {
        "eu_vat_manager"
    }

    fn extract(&self, order: &Order, _settings: &Settings) -> Option<TaxIdentifiers> {
        meta(order, "_billing_eu_vat_number").map(|vat| TaxIdentifiers {
            ic_dph: Some(vat),
            ..Default::default()
        })
    }
}

/// Czech/Slovak checkout fields. Replaces every identifier, not just the
/// VAT id.
pub struct CzSkCheckoutFields;

impl TaxIdProvider for CzSkCheckoutFields {
    fn name(&self) -> &'static str {
        "czsk_checkout_fields"
    }

    fn extract(&self, order: &Order, settings: &Settings) -> Option<TaxIdentifiers> {
        if !settings.is_yes("czsk_checkout_fields", false) {
            return None;
        }
        let vat_key = if order.billing.country == "SK" {
            "_billing_dic_dph"
        } else {
            "_billing_dic"
        };
        Some(TaxIdentifiers {
            ico: meta(order, "_billing_ic"),
            dic: meta(order, "_billing_dic"),
            ic_dph: meta(order, vat_key),
        })
    }
}

/// Company details first, then the VAT integrations by priority.
pub fn default_providers() -> Vec<Box<dyn TaxIdProvider>> {
    vec![
        Box::new(CompanyDetails),
        Box::new(EuVatNumber),
        Box::new(EuVatAssistant),
        Box::new(EuVatCompliance),
        Box::new(EuVatManager),
        Box::new(CzSkCheckoutFields),
    ]
}

pub(super) fn resolve(
    order: &Order,
    settings: &Settings,
    providers: &[Box<dyn TaxIdProvider>],
) -> TaxIdentifiers {
    let mut providers = providers.iter();
    let mut ids = providers
        .next()
        .and_then(|p| p.extract(order, settings))
        .unwrap_or_default();

    if ids.has_vat_id() {
        return ids;
    }

    for provider in providers {
        let Some(found) = provider.extract(order, settings) else {
            continue;
        };
        if found.ic_dph.is_none() {
            continue;
        }
        tracing::debug!(provider = provider.name(), "VAT id taken from provider");
        ids.ic_dph = found.ic_dph;
        if found.ico.is_some() {
            ids.ico = found.ico;
        }
        if found.dic.is_some() {
            ids.dic = found.dic;
        }
        break;
    }
    ids
}
