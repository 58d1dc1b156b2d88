use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Coarse lifecycle of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "PENDING"),
            ItemStatus::Processing => write!(f, "PROCESSING"),
            ItemStatus::Completed => write!(f, "COMPLETED"),
            ItemStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One entry of an item's stage history. Open while `finished_at` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn open(stage: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            stage: stage.into(),
            started_at,
            finished_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// The unit of work moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub payload: serde_json::Value,
    pub callback_url: String,
    pub status: ItemStatus,
    /// Current stage name; `None` until the item is first claimed.
    pub stage: Option<String>,
    pub progress: u8,
    pub eta_seconds: Option<u64>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub history: Vec<StageRecord>,
    pub last_callback_at: Option<DateTime<Utc>>,
    pub callback_tries: u32,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Build a fresh PENDING item. The callback URL must be an absolute http(s) URL.
    pub fn new(
        payload: serde_json::Value,
        callback_url: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let callback_url = callback_url.into();
        validate_callback_url(&callback_url)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            payload,
            callback_url,
            status: ItemStatus::Pending,
            stage: None,
            progress: 0,
            eta_seconds: None,
            locked_by: None,
            locked_at: None,
            stage_started_at: None,
            history: Vec::new(),
            last_callback_at: None,
            callback_tries: 0,
            created_at,
        })
    }

    pub fn is_owned_by(&self, node_id: &str) -> bool {
        self.status == ItemStatus::Processing && self.locked_by.as_deref() == Some(node_id)
    }

    /// When the terminal stage was reached, if it has been.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if self.status != ItemStatus::Completed {
            return None;
        }
        self.history.last().and_then(|r| r.finished_at)
    }
}

fn validate_callback_url(raw: &str) -> Result<(), EngineError> {
    if raw.trim().is_empty() {
        return Err(EngineError::InvalidItem("callbackUrl is required".into()));
    }
    let url = Url::parse(raw)
        .map_err(|e| EngineError::InvalidItem(format!("callbackUrl {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(EngineError::InvalidItem(format!(
            "callbackUrl scheme {other:?} is not http(s)"
        ))),
    }
}
