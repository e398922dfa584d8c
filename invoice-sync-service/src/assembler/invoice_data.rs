use super::{vat, MerchantContext, RemoteLookup};
use crate::models::{
    BankAccountRef, ClientData, DeliveryDate, DocumentType, InvoiceData, MyData, Order,
    OrderStatus, RemoteDocument,
};
use crate::overrides::Overrides;
use crate::settings::Settings;
use chrono::NaiveDate;

pub(super) struct Assembled {
    pub invoice: InvoiceData,
    pub my_data: Option<MyData>,
}

fn sequence_key(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Proforma => "proforma_invoice_sequence_id",
        DocumentType::Regular => "invoice_sequence_id",
        DocumentType::Cancel => "cancel_sequence_id",
    }
}

fn delivery_type(order: &Order, settings: &Settings) -> Option<String> {
    let method = order.shipping_methods.first()?;
    method
        .instance_id
        .as_ref()
        .and_then(|instance| settings.get(&format!("shipping_{}:{}", method.method_id, instance)))
        .or_else(|| settings.get(&format!("shipping_{}", method.method_id)))
}

/// Whether the order status means the customer has paid.
pub(crate) fn order_counts_as_paid(order: &Order, settings: &Settings) -> bool {
    if let Some(statuses) = settings.get_list("invoice_set_as_paid_statuses") {
        return statuses.iter().any(|s| s == order.status.as_str());
    }
    match order.status {
        OrderStatus::Processing => settings.is_yes("invoice_regular_processing_set_as_paid", false),
        OrderStatus::Completed => !settings.is_yes("invoice_regular_dont_set_as_paid", false),
        _ => false,
    }
}

fn variable_symbol(
    order: &Order,
    document_type: DocumentType,
    lookup: &RemoteLookup,
    settings: &Settings,
) -> Option<String> {
    let previous_number = || lookup.existing.as_ref().and_then(|d| d.number_raw.clone());
    match settings.get("variable_symbol").as_deref() {
        Some("invoice_nr") => previous_number(),
        Some("invoice_nr_match") => match document_type {
            DocumentType::Proforma => previous_number(),
            DocumentType::Regular => lookup.proforma.as_ref().and_then(|p| p.variable.clone()),
            DocumentType::Cancel => None,
        },
        Some("order_nr") => Some(order.order_number.clone()),
        _ => None,
    }
}

fn delivery_date(order: &Order, settings: &Settings) -> Option<DeliveryDate> {
    let day = |d: chrono::DateTime<chrono::Utc>| DeliveryDate::Date(d.format("%Y-%m-%d").to_string());
    match settings.get_or("delivery_date_value", "invoice_created").as_str() {
        "order_paid" => order.date_paid.map(day),
        "order_created" => Some(day(order.date_created)),
        "none" => Some(DeliveryDate::none()),
        _ => None,
    }
}

/// "j.n.Y" rendering of a remote payment date.
fn short_date(raw: &str) -> String {
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d.format("%-d.%-m.%Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn paid_by_proforma(proforma: Option<&RemoteDocument>) -> Option<&RemoteDocument> {
    proforma.filter(|p| p.has_payment())
}

pub(super) fn build(
    order: &Order,
    document_type: DocumentType,
    lookup: &RemoteLookup,
    client: &ClientData,
    settings: &Settings,
    merchant: &MerchantContext,
    overrides: &Overrides,
) -> Assembled {
    let prices_mode = if order.prices_include_tax {
        "item_ext"
    } else {
        "document"
    };
    let payment_type = settings.get(&format!("gateway_{}", order.payment_method));

    let mut invoice = InvoiceData {
        invoice_currency: order.currency.clone(),
        delivery_type: delivery_type(order, settings),
        rounding: settings.get_or("rounding", prices_mode),
        issued_by: settings.get("issued_by"),
        issued_by_phone: settings.get("issued_phone"),
        issued_by_web: settings.get("issued_web"),
        issued_by_email: settings.get("issued_email"),
        internal_comment: order.customer_note.clone(),
        order_no: order.order_number.clone(),
        ..Default::default()
    };

    if payment_type.as_deref() == Some("cod") && settings.is_yes("cod_add_rounding_item", false) {
        invoice.add_rounding_item = Some(true);
    }
    invoice.payment_type = payment_type;

    match document_type {
        DocumentType::Regular => {
            invoice.proforma_id = order
                .meta(&DocumentType::Proforma.id_key())
                .and_then(|v| v.parse().ok());
        }
        DocumentType::Cancel => {
            invoice.parent_id = order
                .meta(&DocumentType::Regular.id_key())
                .and_then(|v| v.parse().ok());
        }
        DocumentType::Proforma => {}
    }
    // Only a proforma this invoice actually links to counts.
    let proforma = invoice
        .proforma_id
        .and(lookup.proforma.as_ref());

    invoice.sequence_id = settings.get(sequence_key(document_type));
    invoice.logo_id = settings.get("logo_id");
    if let Some(id) = settings.get("bank_account_id") {
        invoice.bank_accounts = vec![BankAccountRef { id }];
    }
    if settings.is_yes("created_date_as_order", false) {
        invoice.created = Some(order.date_created.format("%Y-%m-%d").to_string());
    }

    invoice.variable = variable_symbol(order, document_type, lookup, settings);
    invoice.delivery = delivery_date(order, settings);

    let reverse_charge =
        vat::reverse_charge(client, &merchant.base_country, &order.billing.country);
    if reverse_charge {
        invoice.vat_transfer = Some(1);
    } else if lookup.is_edit() {
        invoice.vat_transfer = Some(0);
    }

    if settings.is_yes("comments", false) {
        let mut parts = Vec::new();
        if settings.is_yes("comment_add_proforma_payment", false) {
            if let Some(paid) = paid_by_proforma(proforma) {
                parts.push(format!(
                    "Paid with proforma invoice {} on {}.",
                    paid.number,
                    short_date(paid.paydate.as_deref().unwrap_or_default())
                ));
            }
        }
        if reverse_charge {
            parts.extend(settings.get("tax_liability"));
        }
        parts.extend(settings.get("comment"));
        if settings.is_yes("comment_add_order_note", false) && !order.customer_note.is_empty() {
            parts.push(order.customer_note.clone());
        }
        invoice.comment = Some(parts.join("\r\n\r\n"));
    }

    let mut my_data = None;
    if let Some(rule) = settings.country_override(&order.billing.country) {
        let applies_to_client = !rule.vat_id_only_final_consumer || !client.has_vat_id();
        let mut seller = MyData::default();
        if applies_to_client {
            seller.ic_dph = Some(rule.vat_id.clone()).filter(|v| !v.is_empty());
            seller.dic = Some(rule.tax_id.clone()).filter(|v| !v.is_empty());
        }
        let seller = overrides.client_country_data(seller, order);
        if !seller.is_empty() {
            my_data = Some(seller);
        }

        if !rule.bank_account_id.is_empty() {
            invoice.bank_accounts = vec![BankAccountRef {
                id: rule.bank_account_id.clone(),
            }];
        }
        if let Some(sequence) = rule.sequence_id(document_type) {
            invoice.sequence_id = Some(sequence.to_string());
        }
    }

    let set_as_paid = settings.is_yes(
        &format!(
            "invoice_{}_{}_set_as_paid",
            document_type.as_str(),
            order.payment_method
        ),
        false,
    );
    if order_counts_as_paid(order, settings) || set_as_paid {
        let proforma_already_paid = paid_by_proforma(proforma).is_some();
        if !proforma_already_paid {
            invoice.already_paid = Some(true);
            invoice.cash_register_id =
                settings.get(&format!("cash_register_{}", order.payment_method));
        }
    }

    Assembled {
        invoice: overrides.invoice_data(invoice, order, document_type),
        my_data,
    }
}
