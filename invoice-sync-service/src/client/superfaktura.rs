//! reqwest client for the SuperFaktura REST API.

use super::wire::{parse_sequences, parse_tags, AddTagResponse, Sequence, WireDocument};
use super::{ApiError, ApiResponse, InvoiceListing, InvoicingApi};
use crate::config::ApiConfig;
use crate::models::{DocumentType, InvoicePayload, RemoteDocument};
use crate::services::metrics::{API_REQUESTS_TOTAL, API_REQUEST_DURATION};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use service_core::middleware::tracing::REQUEST_ID_HEADER;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SuperFakturaClient {
    client: Client,
    config: ApiConfig,
}

impl SuperFakturaClient {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Check if the API is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.email.is_empty() && !self.config.api_key.expose_secret().is_empty()
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    fn auth_header(&self) -> String {
        let mut fields = vec![
            ("email", self.config.email.as_str()),
            ("apikey", self.config.api_key.expose_secret().as_str()),
        ];
        if let Some(company_id) = &self.config.company_id {
            fields.push(("company_id", company_id.as_str()));
        }
        fields.push(("module", self.config.module.as_str()));
        format!(
            "SFAPI {}",
            serde_urlencoded::to_string(&fields).unwrap_or_default()
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Send with auth headers and return status plus body text.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), ApiError> {
        if !self.is_configured() {
            return Err(ApiError::NotConfigured);
        }

        let timer = API_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let result = request
            .header("Authorization", self.auth_header())
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                timer.observe_duration();
                API_REQUESTS_TOTAL
                    .with_label_values(&[operation, "transport_error"])
                    .inc();
                error!(operation, error = %e, "Invoicing API request failed");
                return Err(ApiError::from(e));
            }
        };

        let status = response.status();
        let body = response.text().await?;
        timer.observe_duration();

        let outcome = if status.is_success() { "ok" } else { "http_error" };
        API_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
        debug!(operation, status = %status, body = %body, "Invoicing API response");

        Ok((status, body))
    }

    /// Create/edit style call: a JSON envelope is expected even on rejection.
    async fn post_document(
        &self,
        operation: &'static str,
        path: &str,
        data: &Value,
    ) -> Result<ApiResponse, ApiError> {
        let request = self
            .client
            .post(self.url(path))
            .form(&[("data", data.to_string())]);
        let (status, body) = self.send(operation, request).await?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(response) if status.is_success() || response.error != 0 => Ok(response),
            Ok(_) | Err(_) if !status.is_success() => Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            }),
            Ok(_) => Err(ApiError::Decode("response without document".to_string())),
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
impl InvoicingApi for SuperFakturaClient {
    #[instrument(skip(self, payload), fields(order_no = %payload.invoice.order_no))]
    async fn create(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError> {
        let data = serde_json::to_value(payload).map_err(|e| ApiError::Decode(e.to_string()))?;
        let response = self.post_document("create", "/invoices/create", &data).await?;
        if let Some((code, message)) = response.rejection() {
            warn!(code, message = %message, "Invoicing API rejected document");
        } else if let Some(doc) = &response.data {
            info!(invoice_id = doc.invoice.id, "Document created");
        }
        Ok(response)
    }

    #[instrument(skip(self, payload), fields(invoice_id = ?payload.invoice.id))]
    async fn edit(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError> {
        let data = serde_json::to_value(payload).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.post_document("edit", "/invoices/edit", &data).await
    }

    #[instrument(skip(self))]
    async fn invoice(&self, id: i64) -> Result<RemoteDocument, ApiError> {
        let request = self.client.get(self.url(&format!("/invoices/view/{}.json", id)));
        let (status, body) = self.send("invoice", request).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if value.get("Invoice").is_none() {
            return Err(ApiError::NotFound);
        }
        let document: WireDocument =
            serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(document.into_remote())
    }

    #[instrument(skip(self, item_ids), fields(count = item_ids.len()))]
    async fn delete_invoice_items(
        &self,
        invoice_id: i64,
        item_ids: &[i64],
    ) -> Result<(), ApiError> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let ids = item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let request = self.client.delete(self.url(&format!(
            "/invoice_items/delete/{}/invoice_id:{}",
            ids, invoice_id
        )));
        let (status, body) = self.send("delete_invoice_items", request).await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_order(
        &self,
        order_no: &str,
        document_type: DocumentType,
    ) -> Result<InvoiceListing, ApiError> {
        // Filters are path parameters in `name:value` form.
        let filter = serde_urlencoded::to_string([("order_no", order_no)])
            .map_err(|e| ApiError::Decode(e.to_string()))?
            .replacen('=', ":", 1);
        let request = self.client.get(self.url(&format!(
            "/invoices/index.json/{}/type:{}",
            filter,
            document_type.as_str()
        )));
        let (status, body) = self.send("find_by_order", request).await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn tags(&self) -> Result<BTreeMap<i64, String>, ApiError> {
        let request = self.client.get(self.url("/tags/index.json"));
        let (status, body) = self.send("tags", request).await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parse_tags(value))
    }

    #[instrument(skip(self))]
    async fn add_tag(&self, name: &str) -> Result<i64, ApiError> {
        let data = json!({ "Tag": { "name": name } });
        let request = self
            .client
            .post(self.url("/tags/add"))
            .form(&[("data", data.to_string())]);
        let (status, body) = self.send("add_tag", request).await?;
        let response: AddTagResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        match response.tag_id {
            Some(id) if response.error == 0 => Ok(id),
            _ => Err(ApiError::Http {
                status: status.as_u16(),
                message: format!("tag '{}' was not created", name),
            }),
        }
    }

    #[instrument(skip(self, email))]
    async fn mark_as_sent(&self, invoice_id: i64, email: &str) -> Result<(), ApiError> {
        let data = json!({
            "InvoiceEmail": {
                "invoice_id": invoice_id,
                "email": email,
            }
        });
        let request = self
            .client
            .post(self.url("/invoices/mark_as_sent"))
            .form(&[("data", data.to_string())]);
        let (status, body) = self.send("mark_as_sent", request).await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sequences(&self) -> Result<Vec<Sequence>, ApiError> {
        let request = self.client.get(self.url("/sequences/index.json"));
        let (status, body) = self.send("sequences", request).await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parse_sequences(value))
    }
}
