//! Operator endpoints: manual creation, regeneration, order view, notices,
//! API connection check.

use crate::models::{AdminNotice, DocumentType, LogEntry, OrderNote, PAYMENT_LINK_KEY};
use crate::orchestrator::{GenerateError, GenerateOptions, Trigger};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;

const RECENT_LOG_ENTRIES: usize = 20;

/// Human message for a result code carried by an admin redirect.
pub fn result_message(code: &str) -> String {
    let text = match code {
        "proforma_ok" => "Proforma invoice was created.",
        "regular_ok" => "Invoice was created.",
        "cancel_ok" => "Credit note was created.",
        "regen_ok" => "Documents were regenerated.",
        "proforma_failed" => "Proforma invoice was not created. See the API log for more information.",
        "regular_failed" => "Invoice was not created. See the API log for more information.",
        "cancel_failed" => "Credit note was not created. See the API log for more information.",
        "regen_failed" => "Documents were not regenerated. See the API log for more information.",
        "duplicate_document" => "Document was not created, because it already exists.",
        "concurrency" => "Document is being created by another request.",
        "skipped" => "Document creation was skipped.",
        other => other,
    };
    text.to_string()
}

fn order_view(order_id: i64, code: &str) -> Redirect {
    Redirect::to(&format!("/admin/orders/{}?result={}", order_id, code))
}

fn order_not_found(order_id: i64) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id))
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub force_create: Option<String>,
}

/// Manual creation link.
pub async fn create_document(
    State(state): State<AppState>,
    Path((order_id, document_type)): Path<(i64, String)>,
    Query(params): Query<CreateParams>,
) -> Result<Redirect, AppError> {
    let document_type = DocumentType::from_string(&document_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown document type {}", document_type))
    })?;
    let force_create = params
        .force_create
        .is_some_and(|v| !matches!(v.as_str(), "0" | "no" | "false"));

    let options = GenerateOptions::new(Trigger::Manual).force_create(force_create);
    let code = match state
        .orchestrator
        .generate_for(order_id, document_type, options)
        .await
    {
        Ok(_) => format!("{}_ok", document_type.as_str()),
        Err(GenerateError::OrderNotFound(_)) => return Err(order_not_found(order_id)),
        Err(e) => e.result_code(document_type),
    };
    tracing::info!(order_id = order_id, document_type = %document_type, result = %code, "Manual creation finished");

    Ok(order_view(order_id, &code))
}

/// Regenerate every existing document of the order.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Redirect, AppError> {
    let mut order = state
        .orchestrator
        .stores()
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| order_not_found(order_id))?;

    let code = match state.orchestrator.regenerate(&mut order).await {
        Ok(_) => "regen_ok",
        Err(e) => {
            tracing::warn!(order_id = order_id, error = %e, "Regeneration failed");
            "regen_failed"
        }
    };
    Ok(order_view(order_id, code))
}

#[derive(Debug, Deserialize)]
pub struct OrderViewParams {
    pub result: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoredDocument {
    pub id: Option<String>,
    pub number: Option<String>,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultNotice {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OrderViewResponse {
    pub order_id: i64,
    pub status: String,
    pub documents: BTreeMap<String, StoredDocument>,
    pub payment_link: Option<String>,
    pub notes: Vec<OrderNote>,
    pub log: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultNotice>,
}

/// Documents, notes and recent API log of one order.
pub async fn view_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Query(params): Query<OrderViewParams>,
) -> Result<Json<OrderViewResponse>, AppError> {
    let stores = state.orchestrator.stores();
    let order = stores
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| order_not_found(order_id))?;
    let log = stores.audit.recent(Some(order_id), RECENT_LOG_ENTRIES).await?;

    let documents = DocumentType::ALL
        .into_iter()
        .filter(|t| order.meta(&t.id_key()).is_some())
        .map(|t| {
            let stored = StoredDocument {
                id: order.meta(&t.id_key()).map(str::to_string),
                number: order.meta(&t.number_key()).map(str::to_string),
                pdf_url: order.meta(&t.pdf_key()).map(str::to_string),
            };
            (t.as_str().to_string(), stored)
        })
        .collect();

    Ok(Json(OrderViewResponse {
        order_id,
        status: order.status.as_str().to_string(),
        documents,
        payment_link: order.meta(PAYMENT_LINK_KEY).map(str::to_string),
        notes: order.notes.clone(),
        log,
        result: params.result.filter(|c| !c.is_empty()).map(|code| ResultNotice {
            message: result_message(&code),
            code,
        }),
    }))
}

/// Pending notices. Reading them clears them.
pub async fn notices(State(state): State<AppState>) -> Result<Json<Vec<AdminNotice>>, AppError> {
    let notices = state.orchestrator.stores().notices.drain().await?;
    Ok(Json(notices))
}

#[derive(Debug, Serialize)]
pub struct ApiCheck {
    pub status: &'static str,
    pub sequences: usize,
}

/// Verify the API credentials by listing the numbering sequences.
pub async fn api_check(State(state): State<AppState>) -> Result<Json<ApiCheck>, AppError> {
    match state.orchestrator.api().sequences().await {
        Ok(sequences) => Ok(Json(ApiCheck {
            status: "ok",
            sequences: sequences.len(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "API connection check failed");
            Err(AppError::BadGateway(e.to_string()))
        }
    }
}
