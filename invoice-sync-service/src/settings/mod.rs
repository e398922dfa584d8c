//! Configuration Resolver.
//!
//! Merchant preferences are a flat key/value map. A [`Settings`] value is an
//! immutable snapshot taken once per generation call; lookups never fail and
//! fall back to the caller's default.

mod language;

pub use language::{map_locale, LOCALE_MAP};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Account language used when a strict lookup lands on an unsupported code.
pub const ACCOUNT_LANG_KEY: &str = "lang";
/// Host locale (e.g. `sk_SK`) used by the `locale` language mode.
pub const HOST_LOCALE_KEY: &str = "locale";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, Value>,
}

impl Settings {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw value, present even when empty.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Non-empty value rendered as a string.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::Bool(false) => None,
            Value::Bool(true) => Some("yes".to_string()),
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Stored value, or `default` when the key is absent.
    ///
    /// An explicitly stored empty string wins over the default.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            None => default.to_string(),
            Some(_) => self.get(key).unwrap_or_default(),
        }
    }

    /// Yes/no switch. Absent keys read as `default`.
    pub fn is_yes(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.as_str(), "yes" | "1" | "on" | "true"),
            Some(_) => false,
        }
    }

    /// String list setting. A missing key is `None`, which is distinct from an
    /// empty list.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        match self.values.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Per-country override block: exact country first, then the `*` wildcard.
    pub fn country_override(&self, country: &str) -> Option<CountryOverride> {
        let rules = self.country_rules()?;
        let pick = |wanted: &str| {
            rules
                .iter()
                .rev()
                .find(|r| r.country == wanted)
                .cloned()
        };
        pick(country).or_else(|| pick("*"))
    }

    fn country_rules(&self) -> Option<Vec<CountryOverride>> {
        let parsed = match self.values.get("country_settings")? {
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => serde_json::from_str::<Vec<CountryOverride>>(s),
            v @ Value::Array(_) => serde_json::from_value::<Vec<CountryOverride>>(v.clone()),
            _ => return None,
        };
        match parsed {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed country settings");
                None
            }
        }
    }

    /// Resolve the document language for an order.
    ///
    /// `mode` is the configured language setting: an explicit code, `locale`
    /// (host locale), `wpml` (language stored on the order), or `endpoint`.
    /// With `strict`, anything that is not a supported code falls back to the
    /// account's home language.
    pub fn language(&self, order_language: Option<&str>, mode: &str, strict: bool) -> String {
        let mut language = mode.to_string();
        match mode {
            "locale" => {
                let locale = self.get(HOST_LOCALE_KEY).unwrap_or_default();
                let short: String = locale.chars().take(2).collect();
                if let Some(code) = map_locale(&short) {
                    language = code.to_string();
                }
            }
            "wpml" => {
                if let Some(code) = order_language.and_then(map_locale) {
                    language = code.to_string();
                }
            }
            _ => {}
        }

        if strict && !LOCALE_MAP.iter().any(|(_, code)| *code == language) {
            language = match self.get(ACCOUNT_LANG_KEY).as_deref() {
                Some("cz") => "cze".to_string(),
                _ => "slo".to_string(),
            };
        }
        language
    }
}

/// Destination-country rule from the `country_settings` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CountryOverride {
    #[serde(deserialize_with = "loose_string")]
    pub country: String,
    #[serde(deserialize_with = "loose_string")]
    pub vat_id: String,
    #[serde(deserialize_with = "loose_bool")]
    pub vat_id_only_final_consumer: bool,
    #[serde(deserialize_with = "loose_string")]
    pub tax_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub bank_account_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub proforma_sequence_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub invoice_sequence_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub cancel_sequence_id: String,
}

impl CountryOverride {
    pub fn sequence_id(&self, document_type: crate::models::DocumentType) -> Option<&str> {
        use crate::models::DocumentType;
        let id = match document_type {
            DocumentType::Proforma => &self.proforma_sequence_id,
            DocumentType::Regular => &self.invoice_sequence_id,
            DocumentType::Cancel => &self.cancel_sequence_id,
        };
        Some(id.as_str()).filter(|s| !s.is_empty())
    }
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0" && s != "no",
        _ => false,
    })
}
