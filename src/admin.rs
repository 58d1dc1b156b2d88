//! Out-of-band maintenance over the item store.
//!
//! These run outside any engine. A reset hands in-flight items back to the
//! queue; an engine holding one of them notices on its next tick that the
//! item is no longer PROCESSING under its lock and drops its slot.

use serde::Serialize;
use tracing::info;

use crate::error::StoreError;
use crate::queue::{ItemStatus, QueueItem};
use crate::store::{ItemFilter, ItemPatch, ItemStore};

/// Return every PROCESSING item to PENDING with its pipeline fields cleared.
/// History and callback bookkeeping are kept. Returns the number reset.
pub async fn reset_processing<S>(store: &S) -> Result<u64, StoreError>
where
    S: ItemStore + ?Sized,
{
    let patch = ItemPatch {
        status: Some(ItemStatus::Pending),
        stage: Some(None),
        progress: Some(0),
        eta_seconds: Some(None),
        locked_by: Some(None),
        locked_at: Some(None),
        stage_started_at: Some(None),
        ..ItemPatch::default()
    };
    let reset = store
        .update_many(&ItemFilter::with_status(ItemStatus::Processing), patch)
        .await?;
    info!(reset, "processing items returned to the queue");
    Ok(reset)
}

/// One in-flight item as shown by [`summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingEntry {
    pub id: String,
    pub stage: Option<String>,
    pub progress: u8,
    pub locked_by: Option<String>,
    pub locked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<QueueItem> for ProcessingEntry {
    fn from(item: QueueItem) -> Self {
        Self {
            id: item.id,
            stage: item.stage,
            progress: item.progress,
            locked_by: item.locked_by,
            locked_at: item.locked_at,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Oldest first.
    pub in_flight: Vec<ProcessingEntry>,
}

impl StoreSummary {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

pub async fn summary<S>(store: &S) -> Result<StoreSummary, StoreError>
where
    S: ItemStore + ?Sized,
{
    let pending = count_status(store, ItemStatus::Pending).await?;
    let processing = count_status(store, ItemStatus::Processing).await?;
    let completed = count_status(store, ItemStatus::Completed).await?;
    let failed = count_status(store, ItemStatus::Failed).await?;

    let in_flight = store
        .find(&ItemFilter::with_status(ItemStatus::Processing), None)
        .await?
        .into_iter()
        .map(ProcessingEntry::from)
        .collect();

    Ok(StoreSummary {
        pending,
        processing,
        completed,
        failed,
        in_flight,
    })
}

async fn count_status<S>(store: &S, status: ItemStatus) -> Result<u64, StoreError>
where
    S: ItemStore + ?Sized,
{
    store.count(&ItemFilter::with_status(status)).await
}
