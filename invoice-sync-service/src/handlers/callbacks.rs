use crate::startup::AppState;
use crate::triggers::CallbackOutcome;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PaymentCallbackParams {
    pub invoice_id: Option<String>,
    pub secret_key: Option<String>,
}

/// Called by the invoicing service once a document is paid.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(params): Query<PaymentCallbackParams>,
) -> Result<Json<CallbackOutcome>, AppError> {
    let (Some(invoice_id), Some(secret_key)) = (params.invoice_id, params.secret_key) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "invoice_id and secret_key are required"
        )));
    };
    let outcome = state
        .dispatcher
        .payment_callback(&invoice_id, &secret_key)
        .await?;
    Ok(Json(outcome))
}
