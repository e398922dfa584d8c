//! Cross-border VAT rules.

use super::MerchantContext;
use crate::models::{ClientData, Extras, Order};
use crate::settings::Settings;

/// EU member states by ISO code.
pub const EU_COUNTRIES: [&str; 27] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Seller countries whose exports outside the EU are always reverse charged.
const HOME_COUNTRIES: [&str; 2] = ["SK", "CZ"];

pub fn is_eu(country: &str) -> bool {
    EU_COUNTRIES.contains(&country)
}

/// Whether tax liability moves to the buyer.
pub fn reverse_charge(client: &ClientData, base_country: &str, billing_country: &str) -> bool {
    let foreign_vat_payer = client.has_vat_id() && base_country != billing_country;
    let export = HOME_COUNTRIES.contains(&base_country)
        && !billing_country.is_empty()
        && !is_eu(billing_country);
    foreign_vat_payer || export
}

/// One-Stop-Shop applies to EU buyers abroad without a VAT id.
pub fn oss_applies(client: &ClientData, base_country: &str, billing_country: &str) -> bool {
    !client.has_vat_id() && base_country != billing_country && is_eu(billing_country)
}

pub(super) fn extras(
    order: &Order,
    client: &ClientData,
    settings: &Settings,
    merchant: &MerchantContext,
) -> Extras {
    let oss = (settings.is_yes("oss", false)
        && oss_applies(client, &merchant.base_country, &order.billing.country))
    .then_some(true);

    let weight = order
        .meta("zasilkovna_custom_weight")
        .or_else(|| order.meta("_cart_weight"))
        .map(str::to_string);

    Extras {
        oss,
        pickup_point_id: order.meta("zasilkovna_id_pobocky").map(str::to_string),
        weight,
    }
}
