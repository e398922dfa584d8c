//! Request payload sent to the invoicing API.
//!
//! Field names follow the remote wire format. Money is serialized as JSON
//! numbers.

use crate::models::DocumentType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ico: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ic_dph: Option<String>,
    pub email: String,
    pub address: String,
    pub country_iso_id: String,
    pub city: String,
    pub zip: String,
    pub phone: String,
    pub update_addressbook: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_country_iso_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_phone: Option<String>,
}

impl ClientData {
    pub fn has_vat_id(&self) -> bool {
        self.ic_dph.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn has_delivery_address(&self) -> bool {
        self.delivery_address.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountRef {
    pub id: String,
}

/// Delivery date field: a calendar date, or the "no delivery date" sentinel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DeliveryDate {
    Date(String),
    Suppressed(i32),
}

impl DeliveryDate {
    pub fn none() -> Self {
        DeliveryDate::Suppressed(-1)
    }
}

impl Serialize for DeliveryDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeliveryDate::Date(date) => serializer.serialize_str(date),
            DeliveryDate::Suppressed(v) => serializer.serialize_i32(*v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    pub invoice_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
    pub rounding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_by_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_by_web: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_by_email: Option<String>,
    pub internal_comment: String,
    pub order_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_rounding_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proforma_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bank_accounts: Vec<BankAccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 1 sets reverse charge, 0 explicitly clears it on an edited document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_transfer: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_register_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_no_formatted: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingDetail {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preconfidence: Option<String>,
}

impl AccountingDetail {
    pub fn is_empty(&self) -> bool {
        self.item_type.is_none()
            && self.analytics_account.is_none()
            && self.synthetic_account.is_none()
            && self.preconfidence.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Absent for adjustment lines; the API then assumes one unit.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_description: Option<String>,
    #[serde(rename = "AccountingDetail", skip_serializing_if = "Option::is_none")]
    pub accounting: Option<AccountingDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSettings {
    pub language: String,
    pub signature: bool,
    pub payment_info: bool,
    pub bysquare: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_payment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oss: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_point_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

/// Seller-side overrides applied to this document only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MyData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ic_dph: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dic: Option<String>,
}

impl MyData {
    pub fn is_empty(&self) -> bool {
        self.ic_dph.is_none() && self.dic.is_none()
    }
}

/// Complete create/edit request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayload {
    #[serde(rename = "Client")]
    pub client: ClientData,
    #[serde(rename = "Invoice")]
    pub invoice: InvoiceData,
    #[serde(rename = "InvoiceItem")]
    pub items: Vec<InvoiceItem>,
    #[serde(rename = "InvoiceSetting")]
    pub settings: InvoiceSettings,
    #[serde(rename = "InvoiceExtra")]
    pub extras: Extras,
    #[serde(rename = "MyData", skip_serializing_if = "Option::is_none")]
    pub my_data: Option<MyData>,
    #[serde(rename = "Tag", skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<i64>,
}
