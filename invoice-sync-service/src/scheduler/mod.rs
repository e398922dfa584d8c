//! Retry/Recovery Scheduler.
//!
//! Failed creations are re-attempted on a fixed schedule through the durable
//! job queue. When the schedule runs out an operator notice is raised instead.

mod worker;

pub use worker::JobWorker;

use crate::models::{AdminNotice, DocumentType, JobKind, Order, ScheduledJob};
use crate::services::metrics::{JOBS_SCHEDULED_TOTAL, NOTICES_TOTAL};
use crate::services::{JobQueue, NoticeStore};
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

/// Delay before retry n (1-based), in minutes.
pub const RETRY_DELAYS_MINUTES: [i64; 3] = [5, 30, 60];
pub const MAX_RETRIES: u32 = RETRY_DELAYS_MINUTES.len() as u32;

/// Delay before looking up the invoice issued for a paid proforma.
pub const FETCH_RELATED_DELAY_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Scheduled {
        attempt: u32,
        delay_minutes: i64,
        run_at: DateTime<Utc>,
    },
    Exhausted {
        attempts: u32,
    },
}

#[derive(Clone)]
pub struct RetryScheduler {
    jobs: Arc<dyn JobQueue>,
    notices: Arc<dyn NoticeStore>,
}

impl RetryScheduler {
    pub fn new(jobs: Arc<dyn JobQueue>, notices: Arc<dyn NoticeStore>) -> Self {
        Self { jobs, notices }
    }

    /// Plan the next attempt after a failed creation.
    ///
    /// Adds an order note either way; the caller persists the order.
    pub async fn schedule_retry(
        &self,
        order: &mut Order,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<RetryDecision, AppError> {
        let previous = order
            .meta(&document_type.retry_attempts_key())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let attempt = previous + 1;

        if attempt <= MAX_RETRIES {
            let delay_minutes = RETRY_DELAYS_MINUTES[(attempt - 1) as usize];
            let run_at = now + Duration::minutes(delay_minutes);
            let job = ScheduledJob::new(
                JobKind::RetryGenerate {
                    order_id: order.id,
                    document_type,
                    attempt,
                },
                run_at,
            );
            self.jobs.schedule(job).await?;
            JOBS_SCHEDULED_TOTAL
                .with_label_values(&["retry_generate"])
                .inc();

            order.add_note(format!(
                "API call to create {} failed. We will try again in {} minutes.",
                document_type.label(),
                delay_minutes
            ));
            info!(
                order_id = order.id,
                document_type = %document_type,
                attempt = attempt,
                delay_minutes = delay_minutes,
                "Retry scheduled"
            );

            return Ok(RetryDecision::Scheduled {
                attempt,
                delay_minutes,
                run_at,
            });
        }

        let notice = AdminNotice::error(
            format!(
                "API call to create {} for order #{} failed {} times. Try creating it manually.",
                document_type.label(),
                order.id,
                attempt
            ),
            Some(order.id),
        );
        self.notices.raise(notice).await?;
        NOTICES_TOTAL.with_label_values(&["error"]).inc();

        order.add_note(format!(
            "API call to create {} failed {} times. Try creating it manually.",
            document_type.label(),
            attempt
        ));
        warn!(
            order_id = order.id,
            document_type = %document_type,
            attempts = attempt,
            "Retries exhausted"
        );

        Ok(RetryDecision::Exhausted { attempts: attempt })
    }

    pub async fn schedule_fetch_related(
        &self,
        proforma_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let job = ScheduledJob::new(
            JobKind::FetchRelated { proforma_id },
            now + Duration::seconds(FETCH_RELATED_DELAY_SECS),
        );
        self.jobs.schedule(job).await?;
        JOBS_SCHEDULED_TOTAL
            .with_label_values(&["fetch_related"])
            .inc();
        info!(proforma_id = proforma_id, "Related invoice lookup scheduled");
        Ok(())
    }
}
