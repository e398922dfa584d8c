//! Event Trigger Layer.
//!
//! Turns order lifecycle events into generation calls. Asynchronous triggers
//! never fail the event itself: outcomes end up in the audit log, order notes
//! and admin notices.

mod callback;

pub use callback::{CallbackOutcome, CallbackRejection};

use crate::models::{DocumentType, Order, OrderStatus};
use crate::orchestrator::{GenerateOptions, Orchestrator, Trigger};
use crate::overrides::Overrides;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument, warn};

/// Payment method used to configure documents for zero-total orders that
/// carry no payment method.
pub const ZERO_VALUE_METHOD: &str = "zero_value";

/// Types considered by the trigger table, in evaluation order.
const TRIGGER_ORDER: [DocumentType; 3] = [
    DocumentType::Regular,
    DocumentType::Proforma,
    DocumentType::Cancel,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    StatusChanged { order_id: i64 },
    CheckoutCompleted { order_id: i64 },
    PaymentCallbackReceived { invoice_id: String, secret_key: String },
}

/// Result of one document attempt, as a short result code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub document_type: DocumentType,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Documents(Vec<DocumentOutcome>),
    Callback(CallbackOutcome),
}

/// Payment method key the trigger settings are stored under.
pub fn effective_payment_method(order: &Order) -> String {
    if order.payment_method.is_empty() && order.is_zero_value() {
        ZERO_VALUE_METHOD.to_string()
    } else {
        order.payment_method.clone()
    }
}

/// Document types the order's current status calls for.
pub fn due_documents(order: &Order, settings: &Settings, overrides: &Overrides) -> Vec<DocumentType> {
    let method = effective_payment_method(order);
    TRIGGER_ORDER
        .into_iter()
        .filter(|&document_type| {
            let configured = match document_type {
                DocumentType::Cancel => None,
                _ => settings.get(&format!("invoice_{}_{}", document_type.as_str(), method)),
            };
            let mut generate = configured.as_deref() == Some(order.status.as_str());

            if !generate
                && document_type == DocumentType::Regular
                && settings.is_yes("invoice_regular_processing_skipped_fix", false)
                && configured.as_deref() == Some(OrderStatus::Processing.as_str())
                && order.status == OrderStatus::Completed
                && !order.needs_processing
            {
                generate = true;
            }

            overrides.generate_decision(generate, order, document_type, &method)
        })
        .collect()
}

#[derive(Clone)]
pub struct EventDispatcher {
    orchestrator: Orchestrator,
}

impl EventDispatcher {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn dispatch(&self, event: OrderEvent) -> Result<DispatchOutcome, AppError> {
        match event {
            OrderEvent::StatusChanged { order_id } => self
                .order_updated(order_id, Trigger::StatusChange)
                .await
                .map(DispatchOutcome::Documents),
            OrderEvent::CheckoutCompleted { order_id } => self
                .order_updated(order_id, Trigger::Checkout)
                .await
                .map(DispatchOutcome::Documents),
            OrderEvent::PaymentCallbackReceived {
                invoice_id,
                secret_key,
            } => self
                .payment_callback(&invoice_id, &secret_key)
                .await
                .map(DispatchOutcome::Callback),
        }
    }

    /// Run the trigger table for the order's current status.
    #[instrument(skip(self, trigger), fields(trigger = trigger.as_str()))]
    pub async fn order_updated(
        &self,
        order_id: i64,
        trigger: Trigger,
    ) -> Result<Vec<DocumentOutcome>, AppError> {
        let Some(mut order) = self.orchestrator.stores().orders.get(order_id).await? else {
            return Err(AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)));
        };
        self.run_triggers(&mut order, trigger).await
    }

    pub(crate) async fn run_triggers(
        &self,
        order: &mut Order,
        trigger: Trigger,
    ) -> Result<Vec<DocumentOutcome>, AppError> {
        let settings = self.orchestrator.stores().settings.snapshot().await?;
        let due = due_documents(order, &settings, self.orchestrator.overrides());
        if due.is_empty() {
            info!(order_id = order.id, status = order.status.as_str(), "No document due");
        }

        let mut outcomes = Vec::with_capacity(due.len());
        for document_type in due {
            let result = match self
                .orchestrator
                .generate(order, document_type, GenerateOptions::new(trigger))
                .await
            {
                Ok(_) => format!("{}_ok", document_type.as_str()),
                Err(e) => {
                    warn!(order_id = order.id, document_type = %document_type, error = %e, "Triggered generation failed");
                    e.result_code(document_type)
                }
            };
            outcomes.push(DocumentOutcome {
                document_type,
                result,
            });
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests_support::order;
    use rust_decimal_macros::dec;

    #[test]
    fn status_matching_configured_value_triggers() {
        let settings = Settings::from_pairs([
            ("invoice_regular_cod", "processing"),
            ("invoice_proforma_cod", "pending"),
        ]);
        let order = order();
        assert_eq!(
            due_documents(&order, &settings, &Overrides::new()),
            vec![DocumentType::Regular]
        );
    }

    #[test]
    fn zero_value_orders_use_pseudo_method() {
        let settings = Settings::from_pairs([("invoice_regular_zero_value", "processing")]);
        let mut order = order();
        order.payment_method = String::new();
        order.total = dec!(0);
        assert_eq!(effective_payment_method(&order), ZERO_VALUE_METHOD);
        assert_eq!(
            due_documents(&order, &settings, &Overrides::new()),
            vec![DocumentType::Regular]
        );
    }

    #[test]
    fn skipped_processing_workaround() {
        let mut settings = Settings::from_pairs([("invoice_regular_cod", "processing")]);
        let mut order = order();
        order.status = OrderStatus::Completed;
        order.needs_processing = false;
        assert!(due_documents(&order, &settings, &Overrides::new()).is_empty());

        settings.set("invoice_regular_processing_skipped_fix", "yes");
        assert_eq!(
            due_documents(&order, &settings, &Overrides::new()),
            vec![DocumentType::Regular]
        );

        order.needs_processing = true;
        assert!(due_documents(&order, &settings, &Overrides::new()).is_empty());
    }

    #[test]
    fn override_can_force_credit_note() {
        let settings = Settings::default();
        let mut order = order();
        order.status = OrderStatus::Refunded;
        let overrides = Overrides::new().on_generate_decision(|computed, order, t, _| {
            computed || (t == DocumentType::Cancel && order.status == OrderStatus::Refunded)
        });
        assert_eq!(
            due_documents(&order, &settings, &overrides),
            vec![DocumentType::Cancel]
        );
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: OrderEvent =
            serde_json::from_str(r#"{"event":"status_changed","order_id":7}"#).unwrap();
        assert_eq!(event, OrderEvent::StatusChanged { order_id: 7 });
    }
}
