//! Payload Assembler.
//!
//! Turns an order, a settings snapshot and what is already known remotely into
//! a complete create/edit request. Assembly performs no I/O; every remote
//! fact it needs arrives through [`RemoteLookup`].

mod adjustments;
mod client_data;
mod invoice_data;
mod items;
mod tax_ids;
pub(crate) mod text;
pub mod vat;

#[cfg(test)]
pub(crate) mod tests_support;

pub use tax_ids::{default_providers, TaxIdProvider, TaxIdentifiers};

use crate::models::{DocumentType, InvoicePayload, Order, RemoteDocument};
use crate::overrides::Overrides;
use crate::settings::Settings;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Shop-level facts that are not merchant preferences.
#[derive(Debug, Clone, Default)]
pub struct MerchantContext {
    pub base_country: String,
    pub site_url: String,
    pub callback_secret: Option<String>,
}

/// Remote state resolved before assembly.
#[derive(Debug, Clone, Default)]
pub struct RemoteLookup {
    /// The document being edited. `Some` switches the payload to edit mode.
    pub existing: Option<RemoteDocument>,
    /// Proforma linked to a regular invoice.
    pub proforma: Option<RemoteDocument>,
    /// Remote id of the configured document tag.
    pub tag_id: Option<i64>,
}

impl RemoteLookup {
    pub fn is_edit(&self) -> bool {
        self.existing.is_some()
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Line item {item_id} references unknown tax rate {rate_id}")]
    UnknownTaxRate { item_id: i64, rate_id: i64 },

    #[error("Line item {item_id} has zero quantity")]
    ZeroQuantity { item_id: i64 },

    #[error("Line item {item_id} has a discount on a zero subtotal")]
    ZeroSubtotal { item_id: i64 },

    #[error("Refund {refund_id} has no taxable base")]
    ZeroNetRefund { refund_id: i64 },
}

impl BuildError {
    /// Assembly stage that failed, used in the audit log message.
    pub fn stage(&self) -> &'static str {
        match self {
            BuildError::UnknownTaxRate { .. }
            | BuildError::ZeroQuantity { .. }
            | BuildError::ZeroSubtotal { .. } => "items",
            BuildError::ZeroNetRefund { .. } => "refunds",
        }
    }

    /// Message stored with status 990.
    pub fn log_message(&self) -> String {
        format!("{} in assembler::{}", self, self.stage())
    }
}

/// Integer percentage, halves rounded away from zero.
pub(crate) fn round_percent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone)]
pub struct PayloadAssembler {
    settings: Settings,
    overrides: Overrides,
    merchant: MerchantContext,
    providers: Arc<Vec<Box<dyn TaxIdProvider>>>,
}

impl PayloadAssembler {
    pub fn new(settings: Settings, overrides: Overrides, merchant: MerchantContext) -> Self {
        Self {
            settings,
            overrides,
            merchant,
            providers: Arc::new(default_providers()),
        }
    }

    pub fn with_providers(mut self, providers: Vec<Box<dyn TaxIdProvider>>) -> Self {
        self.providers = Arc::new(providers);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Document language for this order, strict and overridable.
    pub fn document_language(&self, order: &Order) -> String {
        let mode = self.settings.get_or("invoice_language", "endpoint");
        let language = self
            .settings
            .language(order.meta("wpml_language"), &mode, true);
        self.overrides.language(language, order)
    }

    pub fn assemble(
        &self,
        order: &Order,
        document_type: DocumentType,
        lookup: &RemoteLookup,
    ) -> Result<InvoicePayload, BuildError> {
        let ids = tax_ids::resolve(order, &self.settings, &self.providers);
        let client = client_data::build(order, ids, &self.settings);
        let client = self.overrides.client_data(client, order);

        let assembled = invoice_data::build(
            order,
            document_type,
            lookup,
            &client,
            &self.settings,
            &self.merchant,
            &self.overrides,
        );

        let settings = self.invoice_settings(order);
        let extras = vat::extras(order, &client, &self.settings, &self.merchant);

        let rates = TaxRates::from_order(order);
        let mut lines = Vec::new();
        if document_type == DocumentType::Cancel && !order.refunds.is_empty() {
            lines.extend(adjustments::refund_lines(order, &self.settings, &self.overrides)?);
        } else {
            lines.extend(items::product_lines(
                order,
                document_type,
                &rates,
                &self.settings,
                &self.overrides,
            )?);
            lines.extend(adjustments::gift_card_lines(order));
            lines.extend(adjustments::fee_lines(order, document_type, &self.settings));
            lines.extend(adjustments::shipping_line(
                order,
                document_type,
                &self.settings,
                &self.overrides,
            ));
            lines.extend(adjustments::discount_line(
                order,
                &rates,
                &self.settings,
                &self.overrides,
            ));
        }

        let extra = self.overrides.extra_items(order, &lines, document_type);
        lines.extend(extra);

        debug!(
            order_id = order.id,
            document_type = %document_type,
            items = lines.len(),
            edit = lookup.is_edit(),
            "Payload assembled"
        );

        Ok(InvoicePayload {
            client,
            invoice: assembled.invoice,
            items: lines,
            settings,
            extras,
            my_data: assembled.my_data,
            tags: lookup.tag_id.into_iter().collect(),
        })
    }

    fn invoice_settings(&self, order: &Order) -> crate::models::InvoiceSettings {
        let callback_payment = if self.settings.get_or("sync_type", "single") == "multi" {
            let secret = self.merchant.callback_secret.clone().unwrap_or_default();
            Some(format!(
                "{}/callbacks/payment?secret_key={}",
                self.merchant.site_url.trim_end_matches('/'),
                secret
            ))
        } else {
            None
        };

        crate::models::InvoiceSettings {
            language: self.document_language(order),
            signature: true,
            payment_info: true,
            bysquare: self.settings.is_yes("bysquare", true),
            callback_payment,
        }
    }
}

/// Tax rate table of an order: rate id to percent.
#[derive(Debug, Clone, Default)]
pub struct TaxRates {
    rates: BTreeMap<i64, Decimal>,
    discountable: BTreeMap<i64, Decimal>,
}

impl TaxRates {
    pub fn from_order(order: &Order) -> Self {
        let mut rates = BTreeMap::new();
        let mut discountable = BTreeMap::new();
        for line in &order.tax_lines {
            rates.insert(line.rate_id, line.rate_percent);
            if line.tax_total > Decimal::ZERO {
                discountable.insert(line.rate_id, line.rate_percent);
            }
        }
        Self {
            rates,
            discountable,
        }
    }

    pub fn rate(&self, rate_id: i64) -> Option<Decimal> {
        self.rates.get(&rate_id).copied()
    }

    /// Highest rate that carried tax; used for the aggregate discount.
    pub fn max_discount_rate(&self) -> Decimal {
        self.discountable
            .values()
            .copied()
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_rounding_goes_away_from_zero() {
        assert_eq!(round_percent(dec!(19.5)), dec!(20));
        assert_eq!(round_percent(dec!(-19.5)), dec!(-20));
        assert_eq!(round_percent(dec!(19.49)), dec!(19));
    }

    #[test]
    fn build_error_message_names_stage() {
        let err = BuildError::ZeroNetRefund { refund_id: 7 };
        assert_eq!(
            err.log_message(),
            "Refund 7 has no taxable base in assembler::refunds"
        );
    }

    fn assembler(settings: Settings) -> PayloadAssembler {
        PayloadAssembler::new(
            settings,
            Overrides::default(),
            MerchantContext {
                base_country: "SK".into(),
                site_url: "https://shop.example/".into(),
                callback_secret: Some("s3cret".into()),
            },
        )
    }

    #[test]
    fn assembles_regular_invoice() {
        let order = tests_support::order();
        let payload = assembler(Settings::default())
            .assemble(&order, DocumentType::Regular, &RemoteLookup::default())
            .unwrap();

        assert_eq!(payload.client.name, "Jana Novakova");
        assert_eq!(payload.invoice.order_no, "1001");
        assert_eq!(payload.invoice.id, None);
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].unit_price, dec!(83.33));
        assert_eq!(payload.items[0].tax, dec!(20));
        assert!(payload.tags.is_empty());
        assert_eq!(payload.settings.callback_payment, None);
        assert!(payload.settings.bysquare);
    }

    #[test]
    fn cancel_with_refunds_only_lists_refunds() {
        let mut order = tests_support::order();
        order.refunds.push(crate::models::Refund {
            id: 5,
            amount: dec!(-12),
            total_tax: dec!(-2),
            reason: String::new(),
            items: vec![],
        });
        let payload = assembler(Settings::default())
            .assemble(&order, DocumentType::Cancel, &RemoteLookup::default())
            .unwrap();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].name, "Refunded");
        assert_eq!(payload.items[0].unit_price, dec!(-10));
    }

    #[test]
    fn cancel_without_refunds_negates_items() {
        let order = tests_support::order();
        let payload = assembler(Settings::default())
            .assemble(&order, DocumentType::Cancel, &RemoteLookup::default())
            .unwrap();
        assert_eq!(payload.items[0].unit_price, dec!(-83.33));
    }

    #[test]
    fn multi_sync_adds_payment_callback_and_tag() {
        let order = tests_support::order();
        let lookup = RemoteLookup {
            tag_id: Some(9),
            ..Default::default()
        };
        let payload = assembler(Settings::from_pairs([("sync_type", serde_json::json!("multi"))]))
            .assemble(&order, DocumentType::Proforma, &lookup)
            .unwrap();
        assert_eq!(
            payload.settings.callback_payment.as_deref(),
            Some("https://shop.example/callbacks/payment?secret_key=s3cret")
        );
        assert_eq!(payload.tags, vec![9]);
    }

    #[test]
    fn build_errors_abort_assembly() {
        let mut order = tests_support::order();
        order.tax_lines.clear();
        let err = assembler(Settings::default())
            .assemble(&order, DocumentType::Regular, &RemoteLookup::default())
            .unwrap_err();
        assert_eq!(err.stage(), "items");
    }

    #[test]
    fn extra_items_are_appended() {
        let order = tests_support::order();
        let overrides = Overrides::default().on_extra_items(|_, items, _| {
            vec![crate::models::InvoiceItem {
                name: format!("Packaging for {} items", items.len()),
                ..Default::default()
            }]
        });
        let assembler = PayloadAssembler::new(Settings::default(), overrides, MerchantContext::default());
        let payload = assembler
            .assemble(&order, DocumentType::Regular, &RemoteLookup::default())
            .unwrap();
        assert_eq!(payload.items.last().map(|i| i.name.as_str()), Some("Packaging for 1 items"));
    }
}
