//! Locally generated document numbers.

use crate::assembler::text::substitute;
use crate::models::{DocumentType, Order};
use crate::services::SettingsStore;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

pub const DEFAULT_TEMPLATE: &str = "[YEAR][MONTH][COUNT]";
const DEFAULT_COUNT_DIGITS: usize = 4;

/// Number for a new document of `document_type`.
///
/// A number already stored on the order is reused, so a retried creation keeps
/// the number of the first attempt. Otherwise the type's counter is advanced
/// and the result is written to the order metadata.
pub async fn custom_number(
    order: &mut Order,
    document_type: DocumentType,
    settings: &Settings,
    counters: &dyn SettingsStore,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let key = document_type.custom_number_key();
    if let Some(existing) = order.meta(&key) {
        return Ok(existing.to_string());
    }

    let template = settings
        .get(&format!("invoice_{}_id_template", document_type.as_str()))
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let digits = settings
        .get("invoice_count_decimals")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_COUNT_DIGITS);

    let count = counters
        .next_counter(&format!("invoice_{}_count", document_type.as_str()))
        .await?;

    let number = substitute(
        &template,
        &[
            ("[YEAR_SHORT]", now.format("%y").to_string()),
            ("[YEAR]", now.format("%Y").to_string()),
            ("[MONTH]", now.format("%m").to_string()),
            ("[DAY]", now.format("%d").to_string()),
            ("[COUNT]", format!("{:0>width$}", count, width = digits)),
            ("[ORDER_NUMBER]", order.order_number.clone()),
        ],
    );
    order.set_meta(&key, number.clone());
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests_support::order;
    use crate::services::MemoryBackend;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn default_template_and_padding() {
        let backend = MemoryBackend::new();
        let mut order = order();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let number = custom_number(&mut order, DocumentType::Regular, &Settings::default(), &backend, now)
            .await
            .unwrap();
        assert_eq!(number, "2024030001");
        assert_eq!(order.meta("regular_custom_number"), Some("2024030001"));
    }

    #[tokio::test]
    async fn template_tokens_and_reuse() {
        let backend = MemoryBackend::new();
        backend.put("invoice_cancel_count", json!(41)).await.unwrap();
        let settings = Settings::from_pairs([
            ("invoice_cancel_id_template", json!("CN[YEAR_SHORT]-[DAY]/[ORDER_NUMBER]/[COUNT]")),
            ("invoice_count_decimals", json!("3")),
        ]);
        let mut order = order();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        let first = custom_number(&mut order, DocumentType::Cancel, &settings, &backend, now)
            .await
            .unwrap();
        assert_eq!(first, "CN24-05/1001/041");

        let again = custom_number(&mut order, DocumentType::Cancel, &settings, &backend, now)
            .await
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(backend.next_counter("invoice_cancel_count").await.unwrap(), 42);
    }
}
