//! Order aggregate as handed over by the shop.
//!
//! The service only reads orders, except for the metadata map and the note
//! list, which are the write contract back to the shop.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "on-hold" => Some(OrderStatus::OnHold),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_1: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    pub email: String,
    pub phone: String,
}

impl Address {
    /// "first last", kept verbatim even when one part is empty.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Street line: address_1 plus address_2 when present.
    pub fn street(&self) -> String {
        if self.address_2.is_empty() {
            self.address_1.clone()
        } else {
            format!("{} {}", self.address_1, self.address_2)
        }
    }

    /// Postal rendering used to compare billing and shipping blocks.
    ///
    /// Contact fields (email, phone) are not part of the postal address.
    pub fn formatted(&self) -> String {
        let name = self.full_name();
        [
            self.company.as_str(),
            name.trim(),
            self.address_1.as_str(),
            self.address_2.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.postcode.as_str(),
            self.country.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Tax amount booked against one tax rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAmount {
    pub rate_id: i64,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl TaxAmount {
    pub fn is_empty(&self) -> bool {
        self.amount.map(|a| a.is_zero()).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub value: String,
    #[serde(default)]
    pub is_variation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub weight: String,
    pub short_description: String,
    pub description: String,
    pub is_variation: bool,
    /// Short description of the parent product when this is a variation.
    pub parent_short_description: String,
    pub attributes: Vec<ProductAttribute>,
    pub categories: Vec<String>,
    pub regular_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
}

impl Product {
    pub fn is_on_sale(&self) -> bool {
        match (self.regular_price, self.sale_price) {
            (Some(regular), Some(sale)) => sale < regular,
            _ => false,
        }
    }

    /// Look up an attribute by display name or slug, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&ProductAttribute> {
        let wanted = slugify(name);
        self.attributes.iter().find(|a| {
            let slug = if a.slug.is_empty() {
                slugify(&a.name)
            } else {
                a.slug.clone()
            };
            slug == wanted || slug == format!("pa_{}", wanted)
        })
    }
}

fn slugify(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

/// Display meta attached to a line item (chosen variation attributes and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub name: String,
    pub quantity: Decimal,
    /// Line subtotal before discounts, excluding tax.
    pub subtotal: Decimal,
    #[serde(default)]
    pub subtotal_tax: Decimal,
    /// Line total after discounts, excluding tax.
    pub total: Decimal,
    #[serde(default)]
    pub total_tax: Decimal,
    /// Per-rate breakdown of `subtotal_tax`, in booking order.
    #[serde(default)]
    pub subtotal_taxes: Vec<TaxAmount>,
    #[serde(default)]
    pub meta: Vec<ItemMeta>,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub name: String,
    pub total: Decimal,
    #[serde(default)]
    pub taxes: Vec<TaxAmount>,
}

impl Fee {
    pub fn tax_total(&self) -> Decimal {
        self.taxes.iter().filter_map(|t| t.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub rate_id: i64,
    #[serde(default)]
    pub label: String,
    pub rate_percent: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub shipping_tax_total: Decimal,
    /// Whether the underlying tax rate is configured to apply to shipping.
    #[serde(default)]
    pub applies_to_shipping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundItem {
    /// Id of the order line item this refund line reverses.
    pub item_id: i64,
    /// Refunded quantity; the sign is ignored.
    pub quantity: Decimal,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub subtotal_tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    /// Refund total including tax; the sign is ignored.
    pub amount: Decimal,
    #[serde(default)]
    pub total_tax: Decimal,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub items: Vec<RefundItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub method_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    FixedCart,
    Percent,
    FixedProduct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub kind: CouponKind,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftCard {
    pub code: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNote {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_method: String,
    pub currency: String,
    #[serde(default)]
    pub currency_symbol: Option<String>,
    pub total: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub shipping_tax: Decimal,
    /// Total discount excluding tax.
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub discount_tax: Decimal,
    #[serde(default)]
    pub prices_include_tax: bool,
    #[serde(default)]
    pub customer_note: String,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_paid: Option<DateTime<Utc>>,
    #[serde(default = "default_needs_processing")]
    pub needs_processing: bool,
    #[serde(default)]
    pub billing: Address,
    #[serde(default)]
    pub shipping: Address,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub fees: Vec<Fee>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
    #[serde(default)]
    pub refunds: Vec<Refund>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
    #[serde(default)]
    pub gift_cards: Vec<GiftCard>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Vec<OrderNote>,
}

fn default_needs_processing() -> bool {
    true
}

impl Order {
    /// Non-empty metadata value for `key`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.meta.insert(key.to_string(), value.into());
    }

    pub fn delete_meta(&mut self, key: &str) {
        self.meta.remove(key);
    }

    pub fn add_note(&mut self, text: impl Into<String>) {
        self.notes.push(OrderNote {
            text: text.into(),
            created_at: Utc::now(),
        });
    }

    /// Total quantity refunded for a line item across all refunds.
    pub fn refunded_quantity(&self, item_id: i64) -> Decimal {
        self.refunds
            .iter()
            .flat_map(|r| r.items.iter())
            .filter(|i| i.item_id == item_id)
            .map(|i| i.quantity.abs())
            .sum()
    }

    pub fn is_zero_value(&self) -> bool {
        self.total.abs().is_zero()
    }

    /// Mark the order as paid the way a gateway completion does.
    pub fn payment_complete(&mut self, at: DateTime<Utc>) {
        self.status = if self.needs_processing {
            OrderStatus::Processing
        } else {
            OrderStatus::Completed
        };
        if self.date_paid.is_none() {
            self.date_paid = Some(at);
        }
    }
}
