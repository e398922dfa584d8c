use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "info" => Some(NoticeLevel::Info),
            "error" => Some(NoticeLevel::Error),
            _ => None,
        }
    }
}

/// Operator notice shown on the next admin view, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub text: String,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AdminNotice {
    pub fn error(text: impl Into<String>, order_id: Option<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level: NoticeLevel::Error,
            text: text.into(),
            order_id,
            created_at: Utc::now(),
        }
    }
}
