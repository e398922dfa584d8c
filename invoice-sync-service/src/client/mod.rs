//! Remote Invoicing Client.
//!
//! [`InvoicingApi`] is the seam the orchestrator talks to; the production
//! implementation is [`SuperFakturaClient`].

mod superfaktura;
mod wire;

pub use superfaktura::SuperFakturaClient;
pub use wire::{ApiResponse, CreatedDocument, ErrorMessage, InvoiceListing, Sequence};

use crate::models::{DocumentType, InvoicePayload, RemoteDocument};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Most item ids accepted by a single delete call.
pub const DELETE_BATCH_SIZE: usize = 50;

/// Error code of a request that never produced an HTTP response.
pub const HTTP_REQUEST_FAILED: &str = "http_request_failed";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout: no response at all.
    #[error("{message}")]
    RequestFailed { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("document not found")]
    NotFound,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invoicing API credentials are not configured")]
    NotConfigured,
}

impl ApiError {
    /// HTTP status reported for the failure, when there was one.
    pub fn status(&self) -> Option<i32> {
        match self {
            ApiError::Http { status, .. } => Some(i32::from(*status)),
            ApiError::NotFound => Some(404),
            _ => None,
        }
    }

    /// Machine-readable failure class.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RequestFailed { .. } => HTTP_REQUEST_FAILED,
            ApiError::Http { .. } => "http_error",
            ApiError::NotFound => "not_found",
            ApiError::Decode(_) => "decode_error",
            ApiError::NotConfigured => "not_configured",
        }
    }

    /// Only failures that never reached the remote side qualify for retry.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ApiError::RequestFailed { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => ApiError::Decode(e.to_string()),
            None => ApiError::RequestFailed {
                message: e.to_string(),
            },
        }
    }
}

/// Operations the integration needs from the invoicing service.
#[async_trait]
pub trait InvoicingApi: Send + Sync {
    /// Issue a new document.
    async fn create(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError>;

    /// Replace the content of an existing document. The payload carries the
    /// remote id and type.
    async fn edit(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError>;

    /// Full document including items, parent and related documents.
    /// A document the remote side does not know is [`ApiError::NotFound`].
    async fn invoice(&self, id: i64) -> Result<RemoteDocument, ApiError>;

    /// Delete items of a document. Callers batch ids by [`DELETE_BATCH_SIZE`].
    async fn delete_invoice_items(&self, invoice_id: i64, item_ids: &[i64])
        -> Result<(), ApiError>;

    /// Documents of `document_type` referencing `order_no`.
    async fn find_by_order(
        &self,
        order_no: &str,
        document_type: DocumentType,
    ) -> Result<InvoiceListing, ApiError>;

    /// Tag id to tag name.
    async fn tags(&self) -> Result<BTreeMap<i64, String>, ApiError>;

    /// Create a tag and return its id.
    async fn add_tag(&self, name: &str) -> Result<i64, ApiError>;

    /// Record that a document was e-mailed to the customer.
    async fn mark_as_sent(&self, invoice_id: i64, email: &str) -> Result<(), ApiError>;

    /// Numbering sequences of the account. Also serves as a credentials check.
    async fn sequences(&self) -> Result<Vec<Sequence>, ApiError>;
}

/// Public PDF link for a document.
pub fn pdf_url(base_url: &str, language: &str, id: i64, token: &str) -> String {
    format!(
        "{}/{}/invoices/pdf/{}/token:{}",
        base_url.trim_end_matches('/'),
        language,
        id,
        token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retry_eligible() {
        let err = ApiError::RequestFailed {
            message: "connection refused".into(),
        };
        assert!(err.is_transport_failure());
        assert_eq!(err.code(), HTTP_REQUEST_FAILED);
        assert_eq!(err.status(), None);

        let err = ApiError::Http {
            status: 502,
            message: "bad gateway".into(),
        };
        assert!(!err.is_transport_failure());
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn pdf_url_layout() {
        assert_eq!(
            pdf_url("https://moja.superfaktura.sk/", "slo", 42, "abc"),
            "https://moja.superfaktura.sk/slo/invoices/pdf/42/token:abc"
        );
    }
}
