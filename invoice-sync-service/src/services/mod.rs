pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use memory::MemoryBackend;
pub use metrics::{get_metrics, init_metrics};
pub use store::{AuditSink, JobQueue, NoticeStore, OrderRepository, SettingsStore};

use std::sync::Arc;

/// Handles to every storage seam, shared by the orchestrator, scheduler and
/// trigger layer.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderRepository>,
    pub settings: Arc<dyn SettingsStore>,
    pub notices: Arc<dyn NoticeStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn postgres(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            orders: db.clone(),
            settings: db.clone(),
            notices: db.clone(),
            jobs: db.clone(),
            audit: db,
        }
    }

    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            orders: backend.clone(),
            settings: backend.clone(),
            notices: backend.clone(),
            jobs: backend.clone(),
            audit: backend,
        }
    }
}
