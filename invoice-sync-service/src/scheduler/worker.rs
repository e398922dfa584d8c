use crate::config::WorkerConfig;
use crate::models::{JobKind, ScheduledJob};
use crate::orchestrator::Orchestrator;
use crate::services::metrics::JOBS_EXECUTED_TOTAL;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Polls the durable job queue and runs due jobs.
#[derive(Clone)]
pub struct JobWorker {
    orchestrator: Orchestrator,
    poll_interval: Duration,
    batch_size: usize,
}

impl JobWorker {
    pub fn new(orchestrator: Orchestrator, config: &WorkerConfig) -> Self {
        Self {
            orchestrator,
            poll_interval: config.poll_interval,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "Starting job worker"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Failed to claim due jobs");
                    }
                }
            }
        }
    }

    /// Claim and run every job due at `now`, up to the batch size.
    /// Returns the number of jobs run.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let jobs = self
            .orchestrator
            .stores()
            .jobs
            .claim_due(now, self.batch_size)
            .await?;
        let count = jobs.len();
        for job in jobs {
            self.execute(job).await;
        }
        Ok(count)
    }

    async fn execute(&self, job: ScheduledJob) {
        let kind = job.kind.name();
        info!(job_id = %job.id, kind = kind, "Running deferred job");

        let result = match job.kind {
            JobKind::RetryGenerate {
                order_id,
                document_type,
                attempt,
            } => {
                self.orchestrator
                    .retry_generate(order_id, document_type, attempt)
                    .await
            }
            JobKind::FetchRelated { proforma_id } => {
                self.orchestrator.fetch_related(proforma_id).await
            }
        };

        let outcome = match result {
            Ok(()) => "ok",
            Err(e) => {
                warn!(job_id = %job.id, kind = kind, error = %e, "Deferred job failed");
                "failed"
            }
        };
        JOBS_EXECUTED_TOTAL.with_label_values(&[kind, outcome]).inc();
    }
}
