use serde::Serialize;

use super::StageEngine;
use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::queue::{ItemStatus, QueueItem};
use crate::store::{ItemFilter, ItemStore};

/// Snapshot of the lane as seen by this engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub processing: Option<QueueItem>,
    pub queue_size: u64,
    /// Nominal pipeline length in seconds.
    pub average_item_seconds: u64,
    pub current_item_eta: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    NotFound,
    /// `position` is 0 while processing or once completed; otherwise it
    /// counts the PENDING items created earlier, starting at 1.
    Found { position: u64, status: ItemStatus },
}

impl QueuePosition {
    pub fn position(&self) -> Option<u64> {
        match self {
            QueuePosition::NotFound => None,
            QueuePosition::Found { position, .. } => Some(*position),
        }
    }
}

impl<S, N> StageEngine<S, N>
where
    S: ItemStore + 'static,
    N: Notifier + 'static,
{
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let held = self.cursor.lock().await.active.clone();
        let mut processing = match held {
            Some(id) => self.store.find_by_id(&id).await?,
            None => None,
        };
        if processing.is_none() {
            processing = self
                .store
                .find(&ItemFilter::with_status(ItemStatus::Processing), Some(1))
                .await?
                .into_iter()
                .next();
        }

        let queue_size = self
            .store
            .count(&ItemFilter::with_status(ItemStatus::Pending))
            .await?;
        let current_item_eta = processing.as_ref().and_then(|item| item.eta_seconds);

        Ok(EngineStatus {
            processing,
            queue_size,
            average_item_seconds: self.plan.total_seconds(),
            current_item_eta,
        })
    }

    pub async fn position(&self, item_id: &str) -> Result<QueuePosition, EngineError> {
        let Some(item) = self.store.find_by_id(item_id).await? else {
            return Ok(QueuePosition::NotFound);
        };

        let position = match item.status {
            ItemStatus::Processing | ItemStatus::Completed => 0,
            ItemStatus::Pending | ItemStatus::Failed => {
                let ahead = ItemFilter::with_status(ItemStatus::Pending).created_before(item.created_at);
                self.store.count(&ahead).await? + 1
            }
        };

        Ok(QueuePosition::Found {
            position,
            status: item.status,
        })
    }
}
