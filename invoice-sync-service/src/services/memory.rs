//! In-process storage for tests and local runs without PostgreSQL.

use super::store::{AuditSink, JobQueue, NoticeStore, OrderRepository, SettingsStore};
use crate::models::{AdminNotice, LogEntry, Order, ScheduledJob};
use crate::settings::Settings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryBackend {
    orders: RwLock<BTreeMap<i64, Order>>,
    settings: RwLock<HashMap<String, Value>>,
    notices: RwLock<Vec<AdminNotice>>,
    jobs: RwLock<Vec<ScheduledJob>>,
    log: RwLock<Vec<LogEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: HashMap<String, Value>) -> Self {
        Self {
            settings: RwLock::new(settings),
            ..Self::default()
        }
    }

    pub async fn insert_order(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    /// Every audit entry in append order.
    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.log.read().await.clone()
    }

    /// Pending notices without draining them.
    pub async fn notices(&self) -> Vec<AdminNotice> {
        self.notices.read().await.clone()
    }
}

#[async_trait]
impl OrderRepository for MemoryBackend {
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AppError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn save(&self, order: &Order) -> Result<(), AppError> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<Order>, AppError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.meta.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsStore for MemoryBackend {
    async fn snapshot(&self) -> Result<Settings, AppError> {
        Ok(Settings::new(self.settings.read().await.clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.settings.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn next_counter(&self, key: &str) -> Result<i64, AppError> {
        let mut settings = self.settings.write().await;
        let current = match settings.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(1),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
            _ => 1,
        };
        settings.insert(key.to_string(), Value::from(current + 1));
        Ok(current)
    }
}

#[async_trait]
impl NoticeStore for MemoryBackend {
    async fn raise(&self, notice: AdminNotice) -> Result<(), AppError> {
        self.notices.write().await.push(notice);
        Ok(())
    }

    async fn drain(&self) -> Result<Vec<AdminNotice>, AppError> {
        Ok(std::mem::take(&mut *self.notices.write().await))
    }
}

#[async_trait]
impl JobQueue for MemoryBackend {
    async fn schedule(&self, job: ScheduledJob) -> Result<(), AppError> {
        self.jobs.write().await.push(job);
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, AppError> {
        let mut jobs = self.jobs.write().await;
        jobs.sort_by_key(|j| j.run_at);
        let mut claimed = Vec::new();
        let mut i = 0;
        while i < jobs.len() && claimed.len() < limit {
            if jobs[i].is_due(now) {
                claimed.push(jobs.remove(i));
            } else {
                i += 1;
            }
        }
        Ok(claimed)
    }

    async fn pending(&self) -> Result<Vec<ScheduledJob>, AppError> {
        let mut jobs = self.jobs.read().await.clone();
        jobs.sort_by_key(|j| j.run_at);
        Ok(jobs)
    }
}

#[async_trait]
impl AuditSink for MemoryBackend {
    async fn append(&self, entry: &LogEntry) -> Result<(), AppError> {
        self.log.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, order_id: Option<i64>, limit: usize) -> Result<Vec<LogEntry>, AppError> {
        Ok(self
            .log
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| order_id.is_none() || e.order_id == order_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, JobKind, RequestKind};
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn counter_returns_previous_value() {
        let backend = MemoryBackend::with_settings(HashMap::from([(
            "invoice_regular_count".to_string(),
            json!("7"),
        )]));
        assert_eq!(backend.next_counter("invoice_regular_count").await.unwrap(), 7);
        assert_eq!(backend.next_counter("invoice_regular_count").await.unwrap(), 8);
        assert_eq!(backend.next_counter("invoice_cancel_count").await.unwrap(), 1);
        assert_eq!(backend.next_counter("invoice_cancel_count").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn claim_takes_only_due_jobs() {
        let backend = MemoryBackend::new();
        let now = Utc::now();
        let job = |minutes| {
            ScheduledJob::new(
                JobKind::RetryGenerate {
                    order_id: 1,
                    document_type: DocumentType::Regular,
                    attempt: 1,
                },
                now + Duration::minutes(minutes),
            )
        };
        backend.schedule(job(5)).await.unwrap();
        backend.schedule(job(-1)).await.unwrap();

        let claimed = backend.claim_due(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(backend.pending().await.unwrap().len(), 1);
        assert!(backend.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notices_drain_once() {
        let backend = MemoryBackend::new();
        backend.raise(AdminNotice::error("failed", Some(3))).await.unwrap();
        assert_eq!(backend.drain().await.unwrap().len(), 1);
        assert!(backend.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_log_is_newest_first() {
        let backend = MemoryBackend::new();
        backend.append(&LogEntry::new(RequestKind::Create).order(1)).await.unwrap();
        backend.append(&LogEntry::new(RequestKind::Edit).order(2)).await.unwrap();
        backend.append(&LogEntry::new(RequestKind::CallbackPaid).order(1)).await.unwrap();

        let entries = backend.recent(Some(1), 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request_type, RequestKind::CallbackPaid);
    }
}
