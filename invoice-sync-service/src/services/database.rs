//! PostgreSQL storage for invoice-sync-service.

use super::store::{AuditSink, JobQueue, NoticeStore, OrderRepository, SettingsStore};
use crate::models::{
    AdminNotice, DocumentType, JobKind, LogEntry, NoticeLevel, Order, RequestKind, ScheduledJob,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::settings::Settings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    order_id: Option<i64>,
    document_type: Option<String>,
    request_type: String,
    response_status: Option<i32>,
    response_message: Option<String>,
    time_utc: DateTime<Utc>,
}

impl LogRow {
    fn into_entry(self) -> Option<LogEntry> {
        Some(LogEntry {
            order_id: self.order_id,
            document_type: self.document_type.as_deref().and_then(DocumentType::from_string),
            request_type: RequestKind::from_string(&self.request_type)?,
            response_status: self.response_status,
            response_message: self.response_message,
            time: self.time_utc,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    payload: Json<JobKind>,
    run_at: DateTime<Utc>,
    created_utc: DateTime<Utc>,
}

impl From<JobRow> for ScheduledJob {
    fn from(row: JobRow) -> Self {
        ScheduledJob {
            id: row.job_id,
            kind: row.payload.0,
            run_at: row.run_at,
            created_at: row.created_utc,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NoticeRow {
    notice_id: Uuid,
    level: String,
    text: String,
    order_id: Option<i64>,
    created_utc: DateTime<Utc>,
}

impl From<NoticeRow> for AdminNotice {
    fn from(row: NoticeRow) -> Self {
        AdminNotice {
            id: row.notice_id,
            level: NoticeLevel::from_string(&row.level).unwrap_or(NoticeLevel::Error),
            text: row.text,
            order_id: row.order_id,
            created_at: row.created_utc,
        }
    }
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoice-sync-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Orders
// -------------------------------------------------------------------------

#[async_trait]
impl OrderRepository for Database {
    #[instrument(skip(self))]
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let order = sqlx::query_scalar::<_, Json<Order>>(
            "SELECT document FROM orders WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get order: {}", e)))?;

        timer.observe_duration();

        Ok(order.map(|o| o.0))
    }

    #[instrument(skip(self, order), fields(order_id = order.id))]
    async fn save(&self, order: &Order) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_order"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, order_number, status, document, updated_utc)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (order_id) DO UPDATE
            SET order_number = EXCLUDED.order_number,
                status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_utc = NOW()
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(Json(order))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save order: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<Order>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_orders_by_meta"])
            .start_timer();

        let orders = sqlx::query_scalar::<_, Json<Order>>(
            r#"
            SELECT document FROM orders
            WHERE document -> 'meta' ->> $1 = $2
            ORDER BY order_id
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find orders by meta: {}", e))
        })?;

        timer.observe_duration();

        Ok(orders.into_iter().map(|o| o.0).collect())
    }
}

// -------------------------------------------------------------------------
// Settings
// -------------------------------------------------------------------------

#[async_trait]
impl SettingsStore for Database {
    #[instrument(skip(self))]
    async fn snapshot(&self) -> Result<Settings, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_settings"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String, Value)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load settings: {}", e))
            })?;

        timer.observe_duration();

        Ok(Settings::new(rows.into_iter().collect()))
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_utc) VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_utc = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store setting: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn next_counter(&self, key: &str) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_counter"])
            .start_timer();

        let previous = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO settings (key, value, updated_utc) VALUES ($1, '2'::jsonb, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = to_jsonb(COALESCE(NULLIF(settings.value #>> '{}', '')::bigint, 1) + 1),
                updated_utc = NOW()
            RETURNING (value #>> '{}')::bigint - 1
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance counter {}: {}", key, e))
        })?;

        timer.observe_duration();

        Ok(previous)
    }
}

// -------------------------------------------------------------------------
// Notices
// -------------------------------------------------------------------------

#[async_trait]
impl NoticeStore for Database {
    #[instrument(skip(self, notice), fields(order_id = ?notice.order_id))]
    async fn raise(&self, notice: AdminNotice) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO admin_notices (notice_id, level, text, order_id, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notice.id)
        .bind(notice.level.as_str())
        .bind(&notice.text)
        .bind(notice.order_id)
        .bind(notice.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to raise notice: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn drain(&self) -> Result<Vec<AdminNotice>, AppError> {
        let mut rows = sqlx::query_as::<_, NoticeRow>(
            r#"
            DELETE FROM admin_notices
            RETURNING notice_id, level, text, order_id, created_utc
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to drain notices: {}", e)))?;

        rows.sort_by_key(|r| r.created_utc);
        Ok(rows.into_iter().map(AdminNotice::from).collect())
    }
}

// -------------------------------------------------------------------------
// Deferred jobs
// -------------------------------------------------------------------------

#[async_trait]
impl JobQueue for Database {
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = job.kind.name()))]
    async fn schedule(&self, job: ScheduledJob) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["schedule_job"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (job_id, kind, payload, run_at, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(job.kind.name())
        .bind(Json(&job.kind))
        .bind(job.run_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to schedule job: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    /// Due jobs are deleted as they are claimed, so each runs at most once
    /// even with several workers polling.
    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_jobs"])
            .start_timer();

        let mut rows = sqlx::query_as::<_, JobRow>(
            r#"
            DELETE FROM scheduled_jobs
            WHERE job_id IN (
                SELECT job_id FROM scheduled_jobs
                WHERE run_at <= $1
                ORDER BY run_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id, payload, run_at, created_utc
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to claim jobs: {}", e)))?;

        timer.observe_duration();

        rows.sort_by_key(|r| r.run_at);
        Ok(rows.into_iter().map(ScheduledJob::from).collect())
    }

    #[instrument(skip(self))]
    async fn pending(&self) -> Result<Vec<ScheduledJob>, AppError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, payload, run_at, created_utc FROM scheduled_jobs ORDER BY run_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list jobs: {}", e)))?;

        Ok(rows.into_iter().map(ScheduledJob::from).collect())
    }
}

// -------------------------------------------------------------------------
// Audit log
// -------------------------------------------------------------------------

#[async_trait]
impl AuditSink for Database {
    #[instrument(skip(self, entry), fields(order_id = ?entry.order_id, request = entry.request_type.as_str()))]
    async fn append(&self, entry: &LogEntry) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_log"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO request_log
                (order_id, document_type, request_type, response_status, response_message, time_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.order_id)
        .bind(entry.document_type.map(|t| t.as_str()))
        .bind(entry.request_type.as_str())
        .bind(entry.response_status)
        .bind(&entry.response_message)
        .bind(entry.time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append log: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent(&self, order_id: Option<i64>, limit: usize) -> Result<Vec<LogEntry>, AppError> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT order_id, document_type, request_type, response_status, response_message, time_utc
            FROM request_log
            WHERE ($1::bigint IS NULL OR order_id = $1)
            ORDER BY log_id DESC
            LIMIT $2
            "#,
        )
        .bind(order_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read log: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let request_type = row.request_type.clone();
                let entry = row.into_entry();
                if entry.is_none() {
                    warn!(request_type = %request_type, "Skipping log row with unknown request type");
                }
                entry
            })
            .collect())
    }
}
