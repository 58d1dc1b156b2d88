//! Corpo JSON enviado ao `callbackUrl` quando um item conclui.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::{ItemStatus, QueueItem, StageRecord};

/// Payload de conclusão. Os campos seguem o formato camelCase esperado
/// pelos consumidores do callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub id: String,
    pub status: ItemStatus,
    pub stage: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub history: Vec<StageRecord>,
    /// Dados do produtor, repassados sem alteração.
    pub payload: serde_json::Value,
}

impl CompletionPayload {
    /// `fallback` é usado quando o histórico não registra o fim da etapa terminal.
    pub fn from_item(item: &QueueItem, fallback: DateTime<Utc>) -> Self {
        Self {
            id: item.id.clone(),
            status: item.status,
            stage: item.stage.clone(),
            finished_at: item.finished_at().unwrap_or(fallback),
            history: item.history.clone(),
            payload: item.payload.clone(),
        }
    }
}
