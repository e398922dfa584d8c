//! Payment notification sent by the invoicing service when a document is
//! paid.

use super::EventDispatcher;
use crate::models::{DocumentType, LogEntry, Order, OrderStatus, RequestKind};
use crate::orchestrator::Trigger;
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

/// Why a callback was refused. The numeric code lands in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackRejection {
    InvalidParameters,
    DocumentNotFound,
    DocumentNotPaid,
    OrderNotFound,
    OrderNotOnHold,
}

impl CallbackRejection {
    pub fn status(&self) -> i32 {
        match self {
            CallbackRejection::InvalidParameters => 901,
            CallbackRejection::DocumentNotFound => 902,
            CallbackRejection::DocumentNotPaid => 903,
            CallbackRejection::OrderNotFound => 904,
            CallbackRejection::OrderNotOnHold => 905,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Rejected { reason: CallbackRejection },
    Paid {
        order_id: i64,
        fetch_related_scheduled: bool,
    },
}

impl EventDispatcher {
    /// Mark the order behind a paid document as paid and run the trigger
    /// table for its new status.
    #[instrument(skip(self, secret_key))]
    pub async fn payment_callback(
        &self,
        invoice_id: &str,
        secret_key: &str,
    ) -> Result<CallbackOutcome, AppError> {
        let orchestrator = self.orchestrator();

        let id = match invoice_id.trim().parse::<i64>() {
            Ok(id) if self.secret_matches(secret_key) => id,
            _ => {
                return self
                    .reject(CallbackRejection::InvalidParameters, None, "Incorrect parameters")
                    .await
            }
        };

        let orders = self.orders_for_document(id).await?;

        let document = match orchestrator.api().invoice(id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Paid document lookup failed");
                return self
                    .reject(
                        CallbackRejection::DocumentNotFound,
                        None,
                        format!("Invoice ID {} not found", id),
                    )
                    .await;
            }
        };
        if !document.is_paid() {
            return self
                .reject(
                    CallbackRejection::DocumentNotPaid,
                    None,
                    format!("Invoice ID {} not paid", id),
                )
                .await;
        }

        let mut order = match <[Order; 1]>::try_from(orders) {
            Ok([order]) => order,
            Err(_) => {
                return self
                    .reject(
                        CallbackRejection::OrderNotFound,
                        None,
                        format!("Order with invoice ID {} not found", id),
                    )
                    .await
            }
        };

        if order.status != OrderStatus::OnHold {
            return self
                .reject(
                    CallbackRejection::OrderNotOnHold,
                    Some(order.id),
                    "Order is not on hold",
                )
                .await;
        }

        order.payment_complete(Utc::now());
        orchestrator.stores().orders.save(&order).await?;
        orchestrator
            .audit()
            .record(LogEntry::new(RequestKind::CallbackPaid).order(order.id))
            .await;
        info!(order_id = order.id, status = order.status.as_str(), "Order marked as paid");

        self.run_triggers(&mut order, Trigger::PaymentCallback).await?;

        // The remote side issues the invoice for a paid proforma only after
        // calling back.
        let fetch_related_scheduled = document.kind == DocumentType::Proforma.as_str()
            && order.meta(&DocumentType::Regular.id_key()).is_none();
        if fetch_related_scheduled {
            orchestrator
                .scheduler()
                .schedule_fetch_related(id, Utc::now())
                .await?;
        }

        Ok(CallbackOutcome::Paid {
            order_id: order.id,
            fetch_related_scheduled,
        })
    }

    fn secret_matches(&self, given: &str) -> bool {
        match &self.orchestrator().merchant().callback_secret {
            None => true,
            Some(expected) => bool::from(expected.as_bytes().ct_eq(given.as_bytes())),
        }
    }

    /// Orders referencing `id` as proforma, else as regular invoice.
    async fn orders_for_document(&self, id: i64) -> Result<Vec<Order>, AppError> {
        let orders = self.orchestrator().stores().orders.as_ref();
        let value = id.to_string();
        let by_proforma = orders
            .find_by_meta(&DocumentType::Proforma.id_key(), &value)
            .await?;
        if !by_proforma.is_empty() {
            return Ok(by_proforma);
        }
        orders
            .find_by_meta(&DocumentType::Regular.id_key(), &value)
            .await
    }

    async fn reject(
        &self,
        reason: CallbackRejection,
        order_id: Option<i64>,
        message: impl Into<String>,
    ) -> Result<CallbackOutcome, AppError> {
        let message = message.into();
        warn!(status = reason.status(), error = %message, "Payment callback refused");
        let mut entry = LogEntry::new(RequestKind::CallbackPaid).status(reason.status(), message);
        if let Some(order_id) = order_id {
            entry = entry.order(order_id);
        }
        self.orchestrator().audit().record(entry).await;
        Ok(CallbackOutcome::Rejected { reason })
    }
}
