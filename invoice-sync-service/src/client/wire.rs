//! Response shapes of the invoicing API.
//!
//! The remote side is loose with types (numbers arrive as strings, empty
//! objects as `[]`), so the wire structs accept both.

use crate::models::{LinkedDocument, RemoteDocument};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Envelope returned by create and edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "loose_i64")]
    pub error: i64,
    #[serde(default)]
    pub error_message: Option<ErrorMessage>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: Option<CreatedDocument>,
}

fn lenient_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CreatedDocument>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl ApiResponse {
    /// Rejection code and message when the API refused the request.
    ///
    /// The structured `error_message` wins, per-field messages joined;
    /// the flat `message` is the fallback.
    pub fn rejection(&self) -> Option<(i64, String)> {
        if self.error == 0 {
            return None;
        }
        let message = self
            .error_message
            .as_ref()
            .map(ErrorMessage::flatten)
            .filter(|m| !m.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_default();
        Some((self.error, message))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    Text(String),
    Fields(BTreeMap<String, Value>),
}

impl ErrorMessage {
    pub fn flatten(&self) -> String {
        match self {
            ErrorMessage::Text(text) => text.clone(),
            ErrorMessage::Fields(fields) => fields
                .values()
                .map(|v| match v {
                    Value::Array(parts) => parts
                        .iter()
                        .map(value_text)
                        .collect::<Vec<_>>()
                        .join(" "),
                    other => value_text(other),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedDocument {
    #[serde(rename = "Invoice")]
    pub invoice: WireInvoice,
    #[serde(rename = "PaymentLink", default)]
    pub payment_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireInvoice {
    #[serde(deserialize_with = "loose_i64")]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub invoice_no_formatted: String,
    #[serde(default, deserialize_with = "loose_opt_string")]
    pub invoice_no_formatted_raw: Option<String>,
    #[serde(default, deserialize_with = "loose_i64")]
    pub status: i64,
    #[serde(default, deserialize_with = "loose_string")]
    pub token: String,
    #[serde(default, deserialize_with = "loose_opt_i64")]
    pub parent_id: Option<i64>,
    #[serde(default, deserialize_with = "loose_opt_string")]
    pub variable: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string")]
    pub paydate: Option<String>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub tax_document: bool,
}

impl WireInvoice {
    fn linked(&self) -> LinkedDocument {
        LinkedDocument {
            id: self.id,
            kind: self.kind.clone(),
            tax_document: self.tax_document,
        }
    }

    pub fn into_remote(self) -> RemoteDocument {
        RemoteDocument {
            id: self.id,
            kind: self.kind,
            number: self.invoice_no_formatted,
            number_raw: self.invoice_no_formatted_raw,
            status: self.status,
            token: self.token,
            parent_id: self.parent_id,
            variable: self.variable,
            paydate: self.paydate,
            tax_document: self.tax_document,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "Invoice")]
    pub invoice: WireInvoice,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireItem {
    #[serde(deserialize_with = "loose_i64")]
    pub id: i64,
}

/// Full document view.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireDocument {
    #[serde(rename = "Invoice")]
    pub invoice: WireInvoice,
    #[serde(rename = "InvoiceItem", default)]
    pub items: Vec<WireItem>,
    #[serde(rename = "RelatedItems", default)]
    pub related: Vec<Envelope>,
    /// An object, or `[]` when there is no parent.
    #[serde(rename = "Parent", default)]
    pub parent: Option<Value>,
}

impl WireDocument {
    pub fn into_remote(self) -> RemoteDocument {
        let parent = self
            .parent
            .and_then(|v| serde_json::from_value::<Envelope>(v).ok())
            .map(|p| p.invoice.linked());
        let related = self.related.iter().map(|r| r.invoice.linked()).collect();
        let item_ids = self.items.iter().map(|i| i.id).collect();
        RemoteDocument {
            item_ids,
            parent,
            related,
            ..self.invoice.into_remote()
        }
    }
}

/// Search result for documents of an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceListing {
    #[serde(rename = "itemCount", default, deserialize_with = "loose_i64")]
    pub item_count: i64,
    #[serde(default)]
    items: Vec<Envelope>,
}

impl InvoiceListing {
    pub fn from_documents(documents: Vec<RemoteDocument>) -> Self {
        Self {
            item_count: documents.len() as i64,
            items: documents
                .into_iter()
                .map(|d| Envelope {
                    invoice: WireInvoice {
                        id: d.id,
                        kind: d.kind,
                        invoice_no_formatted: d.number,
                        invoice_no_formatted_raw: d.number_raw,
                        status: d.status,
                        token: d.token,
                        parent_id: d.parent_id,
                        variable: d.variable,
                        paydate: d.paydate,
                        tax_document: d.tax_document,
                    },
                })
                .collect(),
        }
    }

    pub fn first(&self) -> Option<RemoteDocument> {
        if self.item_count <= 0 {
            return None;
        }
        self.items.first().map(|e| e.invoice.clone().into_remote())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AddTagResponse {
    #[serde(default, deserialize_with = "loose_i64")]
    pub error: i64,
    #[serde(default, deserialize_with = "loose_opt_i64")]
    pub tag_id: Option<i64>,
}

fn loose_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(loose_opt_i64(deserializer)?.unwrap_or(0))
}

fn loose_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(b)),
        _ => None,
    })
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(loose_opt_string(deserializer)?.unwrap_or_default())
}

fn loose_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    })
}

/// Tag index: either `{"id": "name"}` or a list of `{"id", "name"}` objects.
pub(crate) fn parse_tags(value: Value) -> BTreeMap<i64, String> {
    let mut tags = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (id, name) in map {
                if let (Ok(id), Value::String(name)) = (id.parse::<i64>(), name) {
                    tags.insert(id, name);
                }
            }
        }
        Value::Array(list) => {
            for entry in list {
                let tag = entry.get("Tag").unwrap_or(&entry);
                let id = tag.get("id").and_then(|v| match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                });
                let name = tag.get("name").and_then(Value::as_str);
                if let (Some(id), Some(name)) = (id, name) {
                    tags.insert(id, name.to_string());
                }
            }
        }
        _ => {}
    }
    tags
}

/// A numbering sequence configured on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub id: i64,
    /// Document type the sequence numbers ("regular", "proforma", ...).
    pub document_type: String,
    pub mask: String,
}

/// Sequence index: document type to a list of `{"Sequence": {..}}` entries,
/// or a flat list of such entries.
pub(crate) fn parse_sequences(value: Value) -> Vec<Sequence> {
    let groups: Vec<(Option<String>, Value)> = match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        list @ Value::Array(_) => vec![(None, list)],
        _ => return Vec::new(),
    };

    let mut sequences = Vec::new();
    for (group, entries) in groups {
        let Value::Array(entries) = entries else {
            continue;
        };
        for entry in entries {
            let sequence = entry.get("Sequence").unwrap_or(&entry);
            let Some(id) = sequence.get("id").and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }) else {
                continue;
            };
            let document_type = sequence
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| group.clone())
                .unwrap_or_default();
            let mask = sequence
                .get("mask")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            sequences.push(Sequence {
                id,
                document_type,
                mask,
            });
        }
    }
    sequences
}
