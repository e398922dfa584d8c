use crate::models::DocumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status recorded when the payload could not be assembled.
pub const STATUS_BUILD_FAILED: i32 = 990;
/// Status recorded when the remote call produced no usable response.
pub const STATUS_NO_RESPONSE: i32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Create,
    Edit,
    CallbackPaid,
    EuVatNumber,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Create => "create",
            RequestKind::Edit => "edit",
            RequestKind::CallbackPaid => "callback_paid",
            RequestKind::EuVatNumber => "eu_vat_number",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "create" => Some(RequestKind::Create),
            "edit" => Some(RequestKind::Edit),
            "callback_paid" => Some(RequestKind::CallbackPaid),
            "eu_vat_number" => Some(RequestKind::EuVatNumber),
            _ => None,
        }
    }
}

/// One row of the append-only audit log. A missing status means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub order_id: Option<i64>,
    pub document_type: Option<DocumentType>,
    pub request_type: RequestKind,
    pub response_status: Option<i32>,
    pub response_message: Option<String>,
    pub time: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(request_type: RequestKind) -> Self {
        Self {
            order_id: None,
            document_type: None,
            request_type,
            response_status: None,
            response_message: None,
            time: Utc::now(),
        }
    }

    pub fn order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn document(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    pub fn status(mut self, status: i32, message: impl Into<String>) -> Self {
        self.response_status = Some(status);
        self.response_message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.response_status.is_none()
    }
}
