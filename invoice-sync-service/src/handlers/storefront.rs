use crate::checkout::{self, CompanyFields, CompanyFieldsCheck};
use crate::links::{email_links, order_page_link, EmailLinks, InvoiceLink, Recipient};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct DocumentLinksParams {
    /// Render links for an order e-mail to this recipient.
    pub email: Option<Recipient>,
}

#[derive(Debug, Serialize)]
pub struct DocumentLinksResponse {
    pub order_id: i64,
    pub invoice: Option<InvoiceLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailLinks>,
}

pub async fn document_links(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Query(params): Query<DocumentLinksParams>,
) -> Result<Json<DocumentLinksResponse>, AppError> {
    let stores = state.orchestrator.stores();
    let order = stores
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;
    let settings = stores.settings.snapshot().await?;

    let email = match params.email {
        Some(recipient) => Some(
            email_links(
                state.orchestrator.api().as_ref(),
                &order,
                &settings,
                recipient,
            )
            .await,
        ),
        None => None,
    };

    Ok(Json(DocumentLinksResponse {
        order_id,
        invoice: order_page_link(&order, &settings),
        email,
    }))
}

/// Validate the company billing fields submitted at checkout.
pub async fn validate_company_fields(
    State(state): State<AppState>,
    Json(fields): Json<CompanyFields>,
) -> Result<Json<CompanyFieldsCheck>, AppError> {
    let settings = state.orchestrator.stores().settings.snapshot().await?;
    let check = checkout::validate_company_fields(&fields, &settings, &state.vies).await;
    if !check.valid {
        tracing::info!(errors = ?check.errors, "Company billing fields rejected");
    }
    Ok(Json(check))
}
