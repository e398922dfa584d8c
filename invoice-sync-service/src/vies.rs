//! EU VAT number validation against the VIES REST service.

use crate::audit::AuditLogger;
use crate::config::ViesConfig;
use crate::models::{LogEntry, RequestKind};
use crate::services::metrics::{API_REQUESTS_TOTAL, API_REQUEST_DURATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Status recorded when the VIES reply could not be read.
pub const STATUS_VIES_BAD_RESPONSE: i32 = 911;
/// Status recorded when VIES could not be reached at all.
pub const STATUS_VIES_UNREACHABLE: i32 = 912;

/// Prefixes VIES accepts. Greece is `EL`, Northern Ireland `XI`.
pub const VIES_PREFIXES: [&str; 28] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "EL", "ES", "FI", "FR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK", "XI",
];

/// `userError` values meaning the member state could not answer.
const UNAVAILABLE: [&str; 5] = [
    "MS_UNAVAILABLE",
    "TIMEOUT",
    "SERVICE_UNAVAILABLE",
    "MS_MAX_CONCURRENT_REQ",
    "GLOBAL_MAX_CONCURRENT_REQ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VatCheck {
    Valid,
    Invalid,
    /// Not an EU number, or VIES gave no answer.
    Unverified,
}

/// Split a VAT number into its prefix and national part, dropping
/// separators. `None` when the prefix is not a VIES country.
pub fn split_vat_number(raw: &str) -> Option<(String, String)> {
    let cleaned: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if cleaned.len() <= 2 {
        return None;
    }
    let (prefix, number) = cleaned.split_at(2);
    VIES_PREFIXES
        .contains(&prefix)
        .then(|| (prefix.to_string(), number.to_string()))
}

#[derive(Debug, Deserialize)]
struct ViesReply {
    #[serde(rename = "userError", default)]
    user_error: Option<String>,
}

#[derive(Clone)]
pub struct ViesClient {
    client: Client,
    base_url: String,
    audit: AuditLogger,
}

impl ViesClient {
    pub fn new(config: &ViesConfig, audit: AuditLogger) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            audit,
        })
    }

    /// Ask VIES about `vat_number`. Failures to get an answer are written to
    /// the audit log and come back as `Unverified`.
    #[instrument(skip(self))]
    pub async fn validate(&self, vat_number: &str) -> VatCheck {
        let Some((prefix, number)) = split_vat_number(vat_number) else {
            debug!("Not an EU VAT number");
            return VatCheck::Unverified;
        };
        let url = format!("{}/ms/{}/vat/{}", self.base_url, prefix, number);

        let timer = API_REQUEST_DURATION
            .with_label_values(&["vies_check"])
            .start_timer();
        let result = self.client.get(&url).send().await;
        timer.observe_duration();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                API_REQUESTS_TOTAL
                    .with_label_values(&["vies_check", "transport_error"])
                    .inc();
                warn!(error = %e, "VIES request failed");
                self.record(STATUS_VIES_UNREACHABLE, e.to_string()).await;
                return VatCheck::Unverified;
            }
        };

        let status = response.status();
        if !status.is_success() {
            API_REQUESTS_TOTAL
                .with_label_values(&["vies_check", "http_error"])
                .inc();
            warn!(status = %status, "VIES answered with an error status");
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            self.record(i32::from(status.as_u16()), reason).await;
            return VatCheck::Unverified;
        }
        API_REQUESTS_TOTAL
            .with_label_values(&["vies_check", "ok"])
            .inc();

        let reply = match response.json::<ViesReply>().await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Unreadable VIES response");
                self.record(STATUS_VIES_BAD_RESPONSE, e.to_string()).await;
                return VatCheck::Unverified;
            }
        };

        match reply.user_error.as_deref() {
            Some("VALID") => VatCheck::Valid,
            Some(code) if UNAVAILABLE.contains(&code) => {
                debug!(code, "VIES member state unavailable");
                VatCheck::Unverified
            }
            _ => VatCheck::Invalid,
        }
    }

    async fn record(&self, status: i32, message: String) {
        self.audit
            .record(LogEntry::new(RequestKind::EuVatNumber).status(status, message))
            .await;
    }
}
