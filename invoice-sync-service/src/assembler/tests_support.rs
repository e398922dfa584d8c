//! Order fixtures for assembler unit tests.

use crate::models::{
    Address, LineItem, Order, OrderStatus, Product, TaxAmount, TaxLine,
};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

pub fn address() -> Address {
    Address {
        first_name: "Jana".into(),
        last_name: "Novakova".into(),
        address_1: "Hlavna 1".into(),
        city: "Bratislava".into(),
        postcode: "81101".into(),
        country: "SK".into(),
        email: "jana@example.com".into(),
        phone: "+421900111222".into(),
        ..Default::default()
    }
}

pub fn line_item() -> LineItem {
    LineItem {
        id: 11,
        name: "Linen shirt".into(),
        quantity: dec!(1),
        subtotal: dec!(83.33),
        subtotal_tax: dec!(16.67),
        total: dec!(83.33),
        total_tax: dec!(16.67),
        subtotal_taxes: vec![TaxAmount {
            rate_id: 1,
            amount: Some(dec!(16.67)),
        }],
        meta: vec![],
        product: Some(Product {
            id: 501,
            sku: "SH-01".into(),
            short_description: "<p>Soft &amp; light</p>".into(),
            ..Default::default()
        }),
    }
}

/// 100.00 order, one 20% line, cash on delivery, no shipping.
pub fn order() -> Order {
    Order {
        id: 1001,
        order_number: "1001".into(),
        status: OrderStatus::Processing,
        payment_method: "cod".into(),
        currency: "EUR".into(),
        currency_symbol: Some("€".into()),
        total: dec!(100),
        shipping_total: dec!(0),
        shipping_tax: dec!(0),
        discount_total: dec!(0),
        discount_tax: dec!(0),
        prices_include_tax: false,
        customer_note: String::new(),
        date_created: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        date_paid: None,
        needs_processing: true,
        billing: address(),
        shipping: address(),
        items: vec![line_item()],
        fees: vec![],
        tax_lines: vec![TaxLine {
            rate_id: 1,
            label: "VAT".into(),
            rate_percent: dec!(20),
            tax_total: dec!(16.67),
            shipping_tax_total: dec!(0),
            applies_to_shipping: true,
        }],
        refunds: vec![],
        shipping_methods: vec![],
        coupons: vec![],
        gift_cards: vec![],
        meta: BTreeMap::new(),
        notes: vec![],
    }
}
