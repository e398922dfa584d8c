//! Advisory per-minute lock on (order, document type).
//!
//! The lock is a file created exclusively in the lock directory. Its name
//! carries the current minute, so a lock left behind by a crashed process
//! stops blocking once the minute rolls over.

use crate::models::DocumentType;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock is held by another request")]
    Held,

    #[error("lock directory unusable: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    released: bool,
}

pub fn lock_file_name(order_id: i64, document_type: DocumentType, now: DateTime<Utc>) -> String {
    format!(
        "lock_{}_{}_{}",
        order_id,
        document_type.as_str(),
        now.format("%Y%m%d%H%M")
    )
}

impl DocumentLock {
    /// Fails with [`LockError::Held`] while another request holds the lock.
    pub async fn acquire(
        dir: &Path,
        order_id: i64,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<Self, LockError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(lock_file_name(order_id, document_type, now));
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => LockError::Held,
                _ => LockError::Io(e),
            })?;
        debug!(path = %path.display(), "Lock acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Remove the lock file, optionally holding it for `grace` first.
    pub async fn release(mut self, grace: Option<Duration>) {
        if let Some(grace) = grace {
            tokio::time::sleep(grace).await;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        }
        self.released = true;
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
