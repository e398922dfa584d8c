use crate::models::DocumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deferred work item payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Re-attempt a failed document creation.
    RetryGenerate {
        order_id: i64,
        document_type: DocumentType,
        attempt: u32,
    },
    /// Pick up the invoice the remote side issued after a proforma got paid.
    FetchRelated { proforma_id: i64 },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::RetryGenerate { .. } => "retry_generate",
            JobKind::FetchRelated { .. } => "fetch_related",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(kind: JobKind, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            run_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now
    }
}
