use crate::startup::AppState;
use crate::triggers::{DispatchOutcome, OrderEvent};
use axum::{extract::State, Json};
use service_core::error::AppError;

/// Order lifecycle events pushed by the shop.
pub async fn receive_event(
    State(state): State<AppState>,
    Json(event): Json<OrderEvent>,
) -> Result<Json<DispatchOutcome>, AppError> {
    tracing::info!(event = event_name(&event), "Order event received");
    let outcome = state.dispatcher.dispatch(event).await?;
    Ok(Json(outcome))
}

fn event_name(event: &OrderEvent) -> &'static str {
    match event {
        OrderEvent::StatusChanged { .. } => "status_changed",
        OrderEvent::CheckoutCompleted { .. } => "checkout_completed",
        OrderEvent::PaymentCallbackReceived { .. } => "payment_callback_received",
    }
}
