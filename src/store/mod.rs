//! Item persistence seam.
//!
//! The engine needs very little from a backend: an atomic conditional update
//! that picks the oldest match, lookup by id, counting and ordered finds.
//! [`ItemFilter`] and [`ItemPatch`] are plain data so any backend that can
//! express "update one where ... order by created_at" can implement
//! [`ItemStore`].

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::queue::{ItemStatus, QueueItem, StageRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFilter {
    /// No `locked_by` recorded.
    Unlocked,
    HeldBy(String),
}

/// Conjunction of optional conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub id: Option<String>,
    pub status: Option<ItemStatus>,
    pub lock: Option<LockFilter>,
    pub created_before: Option<DateTime<Utc>>,
}

impl ItemFilter {
    pub fn with_status(status: ItemStatus) -> Self {
        Self::default().status(status)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.lock = Some(LockFilter::Unlocked);
        self
    }

    pub fn held_by(mut self, node_id: impl Into<String>) -> Self {
        self.lock = Some(LockFilter::HeldBy(node_id.into()));
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn matches(&self, item: &QueueItem) -> bool {
        if self.id.as_deref().is_some_and(|id| id != item.id) {
            return false;
        }
        if self.status.is_some_and(|s| s != item.status) {
            return false;
        }
        match &self.lock {
            Some(LockFilter::Unlocked) if item.locked_by.is_some() => return false,
            Some(LockFilter::HeldBy(node)) if item.locked_by.as_deref() != Some(node.as_str()) => {
                return false;
            }
            _ => {}
        }
        if self.created_before.is_some_and(|t| item.created_at >= t) {
            return false;
        }
        true
    }
}

/// Field assignments applied by an update. `None` leaves a field untouched;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub stage: Option<Option<String>>,
    pub progress: Option<u8>,
    pub eta_seconds: Option<Option<u64>>,
    pub locked_by: Option<Option<String>>,
    pub locked_at: Option<Option<DateTime<Utc>>>,
    pub stage_started_at: Option<Option<DateTime<Utc>>>,
    pub history: Option<Vec<StageRecord>>,
    pub last_callback_at: Option<Option<DateTime<Utc>>>,
    pub callback_tries: Option<u32>,
}

impl ItemPatch {
    /// The fields the owning engine mutates while driving an item.
    pub fn pipeline_state(item: &QueueItem) -> Self {
        Self {
            status: Some(item.status),
            stage: Some(item.stage.clone()),
            progress: Some(item.progress),
            eta_seconds: Some(item.eta_seconds),
            stage_started_at: Some(item.stage_started_at),
            history: Some(item.history.clone()),
            ..Self::default()
        }
    }

    /// Callback bookkeeping only.
    pub fn callback_state(item: &QueueItem) -> Self {
        Self {
            last_callback_at: Some(item.last_callback_at),
            callback_tries: Some(item.callback_tries),
            ..Self::default()
        }
    }

    pub fn lock(node_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            locked_by: Some(Some(node_id.into())),
            locked_at: Some(Some(at)),
            ..Self::default()
        }
    }

    pub fn apply(self, item: &mut QueueItem) {
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(stage) = self.stage {
            item.stage = stage;
        }
        if let Some(progress) = self.progress {
            item.progress = progress;
        }
        if let Some(eta) = self.eta_seconds {
            item.eta_seconds = eta;
        }
        if let Some(locked_by) = self.locked_by {
            item.locked_by = locked_by;
        }
        if let Some(locked_at) = self.locked_at {
            item.locked_at = locked_at;
        }
        if let Some(started) = self.stage_started_at {
            item.stage_started_at = started;
        }
        if let Some(history) = self.history {
            item.history = history;
        }
        if let Some(at) = self.last_callback_at {
            item.last_callback_at = at;
        }
        if let Some(tries) = self.callback_tries {
            item.callback_tries = tries;
        }
    }
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert(&self, item: QueueItem) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>, StoreError>;

    /// Atomically apply `patch` to the oldest item (by `created_at`, ties in
    /// insertion order) matching `filter` and return it as updated.
    ///
    /// Concurrent callers racing for the same item must see exactly one
    /// `Some`.
    async fn find_one_and_update(
        &self,
        filter: &ItemFilter,
        patch: ItemPatch,
    ) -> Result<Option<QueueItem>, StoreError>;

    async fn count(&self, filter: &ItemFilter) -> Result<u64, StoreError>;

    /// Matching items, oldest first.
    async fn find(
        &self,
        filter: &ItemFilter,
        limit: Option<usize>,
    ) -> Result<Vec<QueueItem>, StoreError>;

    /// Apply `patch` to every match; returns how many were updated.
    async fn update_many(&self, filter: &ItemFilter, patch: ItemPatch) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item() -> QueueItem {
        QueueItem::new(json!({}), "http://localhost/cb", Utc::now()).unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(ItemFilter::default().matches(&item()));
    }

    #[test]
    fn lock_filters() {
        let mut it = item();
        assert!(ItemFilter::default().unlocked().matches(&it));
        assert!(!ItemFilter::default().held_by("sim-a").matches(&it));

        it.locked_by = Some("sim-a".into());
        assert!(!ItemFilter::default().unlocked().matches(&it));
        assert!(ItemFilter::default().held_by("sim-a").matches(&it));
        assert!(!ItemFilter::default().held_by("sim-b").matches(&it));
    }

    #[test]
    fn created_before_is_strict() {
        let it = item();
        assert!(!ItemFilter::default().created_before(it.created_at).matches(&it));
        assert!(
            ItemFilter::default()
                .created_before(it.created_at + chrono::TimeDelta::milliseconds(1))
                .matches(&it)
        );
    }

    #[test]
    fn patch_sets_and_clears() {
        let mut it = item();
        ItemPatch::lock("sim-a", it.created_at).apply(&mut it);
        assert_eq!(it.locked_by.as_deref(), Some("sim-a"));

        ItemPatch {
            locked_by: Some(None),
            progress: Some(40),
            ..ItemPatch::default()
        }
        .apply(&mut it);
        assert_eq!(it.locked_by, None);
        assert_eq!(it.locked_at, Some(it.created_at));
        assert_eq!(it.progress, 40);
    }

    #[test]
    fn callback_patch_leaves_pipeline_state_alone() {
        let mut source = item();
        source.callback_tries = 2;
        source.progress = 77;

        let mut target = item();
        ItemPatch::callback_state(&source).apply(&mut target);
        assert_eq!(target.callback_tries, 2);
        assert_eq!(target.progress, 0);
    }
}
