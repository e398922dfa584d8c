//! Audit Logger: append-only record of every API interaction.

use crate::models::LogEntry;
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::AuditSink;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append `entry`. Storage failures are logged and swallowed.
    pub async fn record(&self, entry: LogEntry) {
        info!(
            order_id = ?entry.order_id,
            document_type = ?entry.document_type,
            request_type = entry.request_type.as_str(),
            response_status = ?entry.response_status,
            response_message = ?entry.response_message,
            "API interaction recorded"
        );

        if let Err(e) = self.sink.append(&entry).await {
            ERRORS_TOTAL.with_label_values(&["audit_log"]).inc();
            warn!(error = %e, order_id = ?entry.order_id, "Failed to persist audit log entry");
        }
    }
}
