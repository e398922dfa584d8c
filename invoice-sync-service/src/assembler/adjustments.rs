//! Non-product lines: refunds, gift cards, fees, shipping and the aggregate
//! discount.

use super::items::DEFAULT_DISCOUNT_NAME;
use super::{round_percent, BuildError, TaxRates};
use crate::models::{
    AccountingDetail, CouponKind, DocumentType, InvoiceItem, Order, Refund,
};
use crate::overrides::Overrides;
use crate::settings::Settings;
use rust_decimal::Decimal;

const DEFAULT_SHIPPING_NAME: &str = "Poštovné";

/// Accounting fields configured for a line category
/// ("product", "fees", "shipping", "discount").
pub(super) fn accounting(settings: &Settings, category: &str) -> Option<AccountingDetail> {
    let detail = AccountingDetail {
        item_type: settings.get(&format!("item_type_{}", category)),
        analytics_account: settings.get(&format!("analytics_account_{}", category)),
        synthetic_account: settings.get(&format!("synthetic_account_{}", category)),
        preconfidence: settings.get(&format!("preconfidence_{}", category)),
    };
    (!detail.is_empty()).then_some(detail)
}

/// "Coupons: SPRING (10%), WELCOME (5 EUR)".
pub(super) fn coupon_description(order: &Order, settings: &Settings) -> Option<String> {
    if order.coupons.is_empty() {
        return None;
    }
    let show_code = settings.is_yes("product_description_show_coupon_code", true);
    let entries = order
        .coupons
        .iter()
        .map(|coupon| {
            let sign = match coupon.kind {
                CouponKind::FixedCart => format!(" {}", order.currency),
                CouponKind::Percent => "%".to_string(),
                CouponKind::FixedProduct => String::new(),
            };
            let amount = format!("{}{}", coupon.amount.normalize(), sign);
            if show_code {
                format!("{} ({})", coupon.code, amount)
            } else {
                amount
            }
        })
        .collect::<Vec<_>>();
    Some(format!("Coupons: {}", entries.join(", ")))
}

fn signed(value: Decimal, document_type: DocumentType) -> Decimal {
    if document_type == DocumentType::Cancel {
        -value
    } else {
        value
    }
}

fn refund_line(
    refund: &Refund,
    subtract_refunded_items: bool,
) -> Result<Option<InvoiceItem>, BuildError> {
    let (items_gross, items_net) = if subtract_refunded_items {
        refund.items.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(gross, net), item| {
                (
                    gross + (item.subtotal + item.subtotal_tax).abs(),
                    net + item.subtotal.abs(),
                )
            },
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let amount = refund.amount.abs();
    let price = amount - items_gross;
    if price <= Decimal::ZERO {
        return Ok(None);
    }
    let net = amount - refund.total_tax.abs() - items_net;
    if net.is_zero() {
        return Err(BuildError::ZeroNetRefund {
            refund_id: refund.id,
        });
    }

    Ok(Some(InvoiceItem {
        name: "Refunded".to_string(),
        description: Some(refund.reason.clone()).filter(|r| !r.is_empty()),
        unit_price: -net,
        tax: round_percent((price - net) / net * Decimal::ONE_HUNDRED),
        ..Default::default()
    }))
}

/// Credit note lines for an order with refunds; one line per refund.
pub(super) fn refund_lines(
    order: &Order,
    settings: &Settings,
    overrides: &Overrides,
) -> Result<Vec<InvoiceItem>, BuildError> {
    let subtract = settings.is_yes("product_subtract_refunded_qty", false);
    let mut lines = Vec::new();
    for refund in &order.refunds {
        if let Some(item) = refund_line(refund, subtract)? {
            lines.push(overrides.refund_line(item, order, refund));
        }
    }
    Ok(lines)
}

pub(super) fn gift_card_lines(order: &Order) -> Vec<InvoiceItem> {
    order
        .gift_cards
        .iter()
        .map(|card| InvoiceItem {
            name: "Gift Card".to_string(),
            description: Some(card.code.clone()),
            unit_price: -card.amount,
            tax: Decimal::ZERO,
            ..Default::default()
        })
        .collect()
}

pub(super) fn fee_lines(
    order: &Order,
    document_type: DocumentType,
    settings: &Settings,
) -> Vec<InvoiceItem> {
    order
        .fees
        .iter()
        .map(|fee| {
            let tax = if fee.total.is_zero() {
                Decimal::ZERO
            } else {
                round_percent(fee.tax_total() / fee.total * Decimal::ONE_HUNDRED)
            };
            InvoiceItem {
                name: fee.name.clone(),
                unit_price: signed(fee.total, document_type),
                tax,
                accounting: accounting(settings, "fees"),
                ..Default::default()
            }
        })
        .collect()
}

pub(super) fn shipping_line(
    order: &Order,
    document_type: DocumentType,
    settings: &Settings,
    overrides: &Overrides,
) -> Option<InvoiceItem> {
    let price = order.shipping_total + order.shipping_tax;
    let tax = order
        .tax_lines
        .iter()
        .filter(|t| !t.shipping_tax_total.is_zero() || t.applies_to_shipping)
        .last()
        .map(|t| t.rate_percent)
        .unwrap_or(Decimal::ZERO);

    let name = if price > Decimal::ZERO {
        settings.get_or("shipping_item_name", DEFAULT_SHIPPING_NAME)
    } else {
        settings.get("free_shipping_name").unwrap_or_default()
    };
    if name.is_empty() {
        return None;
    }

    let net = price / (Decimal::ONE + tax / Decimal::ONE_HUNDRED);
    let item = InvoiceItem {
        name,
        unit_price: signed(net, document_type),
        tax,
        accounting: accounting(settings, "shipping"),
        ..Default::default()
    };
    Some(overrides.shipping_line(item, order))
}

/// Single discount line used when coupons are not spread over the items.
///
/// The highest rate that carried tax is used when several rates are present.
pub(super) fn discount_line(
    order: &Order,
    rates: &TaxRates,
    settings: &Settings,
    overrides: &Overrides,
) -> Option<InvoiceItem> {
    if settings.get_or("coupon_invoice_items", "total") != "total" || order.discount_total.is_zero()
    {
        return None;
    }
    let tax = rates.max_discount_rate();
    let unit_price = if tax.is_zero() {
        -order.discount_total
    } else {
        -(order.discount_total + order.discount_tax) / (Decimal::ONE + tax / Decimal::ONE_HUNDRED)
    };

    let item = InvoiceItem {
        name: settings.get_or("discount_name", DEFAULT_DISCOUNT_NAME),
        description: coupon_description(order, settings),
        unit_price,
        tax,
        accounting: accounting(settings, "discount"),
        ..Default::default()
    };
    Some(overrides.discount_line(item, order))
}
