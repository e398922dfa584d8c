//! Storage seams.
//!
//! Orders, merchant settings, notices, deferred jobs and the audit log are
//! reached only through these traits. [`super::Database`] backs them with
//! PostgreSQL and [`super::MemoryBackend`] keeps everything in process.

use crate::models::{AdminNotice, LogEntry, Order, ScheduledJob};
use crate::settings::Settings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use service_core::error::AppError;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AppError>;
    async fn save(&self, order: &Order) -> Result<(), AppError>;
    /// Orders whose metadata `key` equals `value`.
    async fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<Order>, AppError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Immutable view of every merchant preference.
    async fn snapshot(&self) -> Result<Settings, AppError>;
    async fn put(&self, key: &str, value: Value) -> Result<(), AppError>;
    /// Atomically advance a numeric setting, returning the value before the
    /// increment. A missing counter starts at 1.
    async fn next_counter(&self, key: &str) -> Result<i64, AppError>;
}

#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn raise(&self, notice: AdminNotice) -> Result<(), AppError>;
    /// Remove and return every pending notice, oldest first.
    async fn drain(&self) -> Result<Vec<AdminNotice>, AppError>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn schedule(&self, job: ScheduledJob) -> Result<(), AppError>;
    /// Take up to `limit` jobs due at `now` off the queue.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<ScheduledJob>, AppError>;
    async fn pending(&self) -> Result<Vec<ScheduledJob>, AppError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<(), AppError>;
    /// Latest entries, newest first, optionally for one order.
    async fn recent(&self, order_id: Option<i64>, limit: usize) -> Result<Vec<LogEntry>, AppError>;
}
