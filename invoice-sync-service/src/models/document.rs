//! Document types and the order metadata contract.

use serde::{Deserialize, Serialize};

/// Metadata key holding the online payment link of the latest document.
pub const PAYMENT_LINK_KEY: &str = "payment_link";

/// Kind of document issued for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Proforma,
    Regular,
    Cancel,
}

impl DocumentType {
    /// Every type in regeneration order.
    pub const ALL: [DocumentType; 3] = [
        DocumentType::Proforma,
        DocumentType::Regular,
        DocumentType::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Proforma => "proforma",
            DocumentType::Regular => "regular",
            DocumentType::Cancel => "cancel",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "proforma" => Some(DocumentType::Proforma),
            "regular" => Some(DocumentType::Regular),
            "cancel" => Some(DocumentType::Cancel),
            _ => None,
        }
    }

    /// Human name used in order notes and notices.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Proforma => "proforma invoice",
            DocumentType::Regular => "invoice",
            DocumentType::Cancel => "credit note",
        }
    }

    pub fn created_note(&self) -> &'static str {
        match self {
            DocumentType::Proforma => "Proforma invoice created.",
            DocumentType::Regular => "Invoice created.",
            DocumentType::Cancel => "Credit note created.",
        }
    }

    /// Remote document id.
    pub fn id_key(&self) -> String {
        format!("{}_id", self.as_str())
    }

    /// Formatted document number.
    pub fn number_key(&self) -> String {
        format!("{}_invoice_number", self.as_str())
    }

    /// Public PDF URL.
    pub fn pdf_key(&self) -> String {
        format!("invoice_{}", self.as_str())
    }

    pub fn retry_attempts_key(&self) -> String {
        format!("{}_create_retry_attempts", self.as_str())
    }

    /// Locally generated document number, reused by later attempts.
    pub fn custom_number_key(&self) -> String {
        format!("{}_custom_number", self.as_str())
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote payment state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PaymentStatus::Unpaid),
            2 => Some(PaymentStatus::PartiallyPaid),
            3 => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            PaymentStatus::Unpaid => 1,
            PaymentStatus::PartiallyPaid => 2,
            PaymentStatus::Paid => 3,
        }
    }
}

/// Outcome of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub number: String,
    pub pdf_url: String,
    pub payment_link: Option<String>,
}

/// Summary of a document linked to another one (parent or related).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkedDocument {
    pub id: i64,
    pub kind: String,
    pub tax_document: bool,
}

/// Read-only view of a document owned by the invoicing service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteDocument {
    pub id: i64,
    /// Remote type name ("regular", "proforma", "cancel", ...).
    pub kind: String,
    pub number: String,
    pub number_raw: Option<String>,
    /// Raw status code: 1 unpaid, 2 partially paid, 3 paid.
    pub status: i64,
    pub token: String,
    pub parent_id: Option<i64>,
    pub variable: Option<String>,
    pub paydate: Option<String>,
    pub tax_document: bool,
    pub item_ids: Vec<i64>,
    pub parent: Option<LinkedDocument>,
    pub related: Vec<LinkedDocument>,
}

impl RemoteDocument {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_code(self.status)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status() == Some(PaymentStatus::Paid)
    }

    /// True once any payment was recorded (partial or full).
    pub fn has_payment(&self) -> bool {
        self.status != PaymentStatus::Unpaid.code()
    }

    /// The regular, non tax-document invoice this document links to.
    pub fn related_regular_id(&self) -> Option<i64> {
        let is_regular = |d: &&LinkedDocument| d.kind == "regular" && !d.tax_document;
        let from_parent = self
            .parent_id
            .and(self.parent.as_ref())
            .filter(is_regular)
            .map(|d| d.id);
        from_parent.or_else(|| self.related.iter().filter(is_regular).last().map(|d| d.id))
    }
}
