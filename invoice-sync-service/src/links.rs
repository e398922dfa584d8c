//! Document links shown to customers on the order page and in order e-mails.

use crate::client::InvoicingApi;
use crate::models::{DocumentType, Order, OrderStatus, PAYMENT_LINK_KEY};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The customer-facing document of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceLink {
    pub document_type: DocumentType,
    pub pdf_url: String,
    pub document_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailLinks {
    pub invoice: Option<InvoiceLink>,
    pub payment_link: Option<String>,
}

/// Regular invoice when one exists, else the proforma.
pub fn invoice_link(order: &Order) -> Option<InvoiceLink> {
    [DocumentType::Regular, DocumentType::Proforma]
        .into_iter()
        .find_map(|document_type| {
            let pdf_url = order.meta(&document_type.pdf_key())?;
            Some(InvoiceLink {
                document_type,
                pdf_url: pdf_url.to_string(),
                document_id: order
                    .meta(&document_type.id_key())
                    .and_then(|id| id.parse().ok()),
            })
        })
}

/// Link for the order confirmation page.
pub fn order_page_link(order: &Order, settings: &Settings) -> Option<InvoiceLink> {
    if !settings.is_yes("order_received_invoice_link", true) {
        return None;
    }
    invoice_link(order)
}

fn is_closed(order: &Order) -> bool {
    matches!(
        order.status,
        OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Failed
    )
}

/// Links to embed in an order e-mail.
///
/// Showing a document to the customer marks it as sent on the remote side.
pub async fn email_links(
    api: &dyn InvoicingApi,
    order: &Order,
    settings: &Settings,
    recipient: Recipient,
) -> EmailLinks {
    if is_closed(order) {
        return EmailLinks::default();
    }

    let payment_link = order
        .meta(PAYMENT_LINK_KEY)
        .filter(|_| settings.is_yes("email_payment_link", true))
        .map(str::to_string);

    EmailLinks {
        invoice: email_invoice(api, order, settings, recipient).await,
        payment_link,
    }
}

async fn email_invoice(
    api: &dyn InvoicingApi,
    order: &Order,
    settings: &Settings,
    recipient: Recipient,
) -> Option<InvoiceLink> {
    if order.status == OrderStatus::Completed
        && settings.is_yes("completed_email_skip_invoice", false)
    {
        return None;
    }
    if order.payment_method == "cod" && settings.is_yes("cod_email_skip_invoice", false) {
        return None;
    }

    let link = invoice_link(order)?;

    if link.document_type == DocumentType::Proforma {
        if let Some(id) = link.document_id {
            match api.invoice(id).await {
                Ok(proforma) if proforma.has_payment() => {
                    debug!(proforma_id = id, "Proforma already paid, link withheld");
                    return None;
                }
                Ok(_) => {}
                Err(e) => warn!(proforma_id = id, error = %e, "Failed to read proforma state"),
            }
        }
    }

    if !settings.is_yes("email_invoice_link", true) {
        return None;
    }

    if recipient == Recipient::Customer {
        if let Some(id) = link.document_id.filter(|id| *id != 0) {
            if let Err(e) = api.mark_as_sent(id, &order.billing.email).await {
                debug!(document_id = id, error = %e, "Failed to mark document as sent");
            }
        }
    }

    Some(link)
}
