//! Product lines.

use super::adjustments::{accounting, coupon_description};
use super::text::{plain_text, replace_attribute_tags, substitute};
use super::{BuildError, TaxRates};
use crate::models::{DocumentType, InvoiceItem, LineItem, Order, Product};
use crate::overrides::Overrides;
use crate::settings::Settings;
use rust_decimal::Decimal;

const DEFAULT_DESCRIPTION: &str = "[ATTRIBUTES]\n[SHORT_DESCR]";
pub(super) const DEFAULT_DISCOUNT_NAME: &str = "Zľava";

/// Rate of the last tax the line was booked against, zero when untaxed.
fn line_tax(line: &LineItem, rates: &TaxRates) -> Result<Decimal, BuildError> {
    match line.subtotal_taxes.iter().rev().find(|t| !t.is_empty()) {
        Some(tax) => rates.rate(tax.rate_id).ok_or(BuildError::UnknownTaxRate {
            item_id: line.id,
            rate_id: tax.rate_id,
        }),
        None => Ok(Decimal::ZERO),
    }
}

fn description(line: &LineItem, product: &Product, settings: &Settings) -> String {
    let template = settings.get_or("product_description", DEFAULT_DESCRIPTION);

    let attributes = line
        .meta
        .iter()
        .filter(|m| !m.key.starts_with('_'))
        .map(|m| format!("{}: {}", m.key, m.value))
        .collect::<Vec<_>>()
        .join(", ");
    let non_variation = product
        .attributes
        .iter()
        .filter(|a| !a.is_variation)
        .map(|a| format!("{}: {}", a.name, a.value))
        .collect::<Vec<_>>()
        .join(", ");
    let variation = if product.is_variation {
        plain_text(&product.description)
    } else {
        String::new()
    };
    let short = if product.is_variation {
        &product.parent_short_description
    } else {
        &product.short_description
    };

    let text = substitute(
        &template,
        &[
            ("[ATTRIBUTES]", attributes),
            ("[NON_VARIATIONS_ATTRIBUTES]", non_variation),
            ("[VARIATION]", variation),
            ("[SHORT_DESCR]", plain_text(short)),
            ("[SKU]", product.sku.clone()),
            ("[WEIGHT]", product.weight.clone()),
            ("[CATEGORY]", product.categories.join(", ")),
        ],
    );
    let text = replace_attribute_tags(&text, |name| {
        product.attribute(name).map(|a| a.value.clone())
    });
    text.trim().to_string()
}

/// "Discount -5 €" annotation for products sold below their regular price.
fn sale_note(order: &Order, product: &Product, settings: &Settings) -> Option<String> {
    if product.wholesale_price.is_some()
        || !product.is_on_sale()
        || !settings.is_yes("product_description_show_discount", true)
    {
        return None;
    }
    let discount = product.regular_price? - product.sale_price?;
    if discount.is_zero() {
        return None;
    }
    let symbol = order
        .currency_symbol
        .clone()
        .unwrap_or_else(|| order.currency.clone());
    Some(format!(
        "{} -{} {}",
        settings.get_or("discount_name", DEFAULT_DISCOUNT_NAME),
        discount.normalize(),
        symbol
    ))
}

pub(super) fn product_lines(
    order: &Order,
    document_type: DocumentType,
    rates: &TaxRates,
    settings: &Settings,
    overrides: &Overrides,
) -> Result<Vec<InvoiceItem>, BuildError> {
    let sign = if document_type == DocumentType::Cancel {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };
    let per_item_discounts = settings.get_or("coupon_invoice_items", "total") == "per_item";
    let subtract_refunds = settings.is_yes("product_subtract_refunded_qty", false);
    let skip_free = settings.is_yes("skip_free_products", false);

    let mut lines = Vec::new();
    for line in &order.items {
        let Some(product) = line.product.as_ref() else {
            continue;
        };
        let tax = line_tax(line, rates)?;

        let mut quantity = line.quantity;
        if subtract_refunds {
            quantity -= order.refunded_quantity(line.id);
            if quantity <= Decimal::ZERO {
                continue;
            }
        }
        if quantity.is_zero() {
            return Err(BuildError::ZeroQuantity { item_id: line.id });
        }

        let mut item = InvoiceItem {
            name: plain_text(&line.name),
            quantity: Some(quantity),
            unit: Some("ks".to_string()),
            sku: Some(product.sku.clone()).filter(|s| !s.is_empty()),
            unit_price: sign * line.subtotal / line.quantity,
            tax,
            ..Default::default()
        };

        if per_item_discounts {
            let gross_before = line.subtotal + line.subtotal_tax;
            let discount = (gross_before - (line.total + line.total_tax)) / line.quantity;
            if !discount.is_zero() {
                let unit_gross = gross_before / line.quantity;
                if unit_gross.is_zero() {
                    return Err(BuildError::ZeroSubtotal { item_id: line.id });
                }
                item.discount = Some(discount / unit_gross * Decimal::ONE_HUNDRED);
                let label = settings.get_or("discount_name", DEFAULT_DISCOUNT_NAME);
                item.discount_description = Some(match coupon_description(order, settings) {
                    Some(coupons) => format!("{}, {}", label, coupons),
                    None => label,
                });
            }
        }

        let mut text = description(line, product, settings);
        if let Some(note) = sale_note(order, product, settings) {
            text = format!("{}\n{}", text, note).trim().to_string();
        }
        item.description = Some(text).filter(|t| !t.is_empty());
        item.accounting = accounting(settings, "product");

        let Some(item) = overrides.item_data(item, order, line) else {
            continue;
        };
        if item.unit_price.is_zero() && skip_free {
            continue;
        }
        lines.push(item);
    }
    Ok(lines)
}
