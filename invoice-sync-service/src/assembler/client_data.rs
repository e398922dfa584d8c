use super::tax_ids::TaxIdentifiers;
use crate::models::{ClientData, Order};
use crate::settings::Settings;

fn non_empty(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

pub(super) fn build(order: &Order, ids: TaxIdentifiers, settings: &Settings) -> ClientData {
    let billing = &order.billing;
    let name = if billing.company.is_empty() {
        billing.full_name()
    } else {
        billing.company.clone()
    };

    let mut client = ClientData {
        name,
        ico: ids.ico,
        dic: ids.dic,
        ic_dph: ids.ic_dph,
        email: billing.email.clone(),
        address: billing.street(),
        country_iso_id: billing.country.clone(),
        city: billing.city.clone(),
        zip: billing.postcode.clone(),
        phone: billing.phone.clone(),
        update_addressbook: settings.is_yes("invoice_update_addressbook", false),
        ..Default::default()
    };

    let shipping = &order.shipping;
    if billing.formatted() != shipping.formatted() {
        let delivery_name = if shipping.company.is_empty() {
            shipping.full_name()
        } else if settings.is_yes("invoice_delivery_name", false) {
            format!("{} - {}", shipping.company, shipping.full_name())
        } else {
            shipping.company.clone()
        };
        client.delivery_address = Some(shipping.street());
        client.delivery_city = Some(shipping.city.clone());
        client.delivery_country_iso_id = Some(shipping.country.clone());
        client.delivery_name = Some(delivery_name);
        client.delivery_zip = Some(shipping.postcode.clone());
    }

    client.delivery_phone = non_empty(&shipping.phone);
    client
}
