use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ItemFilter, ItemPatch, ItemStore};
use crate::error::StoreError;
use crate::queue::QueueItem;

/// In-process store. Every operation runs under a single lock, which makes
/// `find_one_and_update` atomic across engines sharing the same instance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Replace a stored item wholesale, bypassing every condition. Meant for
    /// seeding fixtures and out-of-band repairs.
    pub fn overwrite(&self, item: QueueItem) {
        let mut items = self.items.lock();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }
}

fn oldest_first(items: &[QueueItem], filter: &ItemFilter) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..items.len())
        .filter(|&i| filter.matches(&items[i]))
        .collect();
    // Stable sort keeps insertion order among equal timestamps.
    idx.sort_by_key(|&i| items[i].created_at);
    idx
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert(&self, item: QueueItem) -> Result<(), StoreError> {
        let mut items = self.items.lock();
        if items.iter().any(|i| i.id == item.id) {
            return Err(StoreError::Duplicate(item.id));
        }
        items.push(item);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>, StoreError> {
        Ok(self.items.lock().iter().find(|i| i.id == id).cloned())
    }

    async fn find_one_and_update(
        &self,
        filter: &ItemFilter,
        patch: ItemPatch,
    ) -> Result<Option<QueueItem>, StoreError> {
        let mut items = self.items.lock();
        let Some(&target) = oldest_first(&items, filter).first() else {
            return Ok(None);
        };
        let item = &mut items[target];
        patch.apply(item);
        Ok(Some(item.clone()))
    }

    async fn count(&self, filter: &ItemFilter) -> Result<u64, StoreError> {
        Ok(self.items.lock().iter().filter(|i| filter.matches(i)).count() as u64)
    }

    async fn find(
        &self,
        filter: &ItemFilter,
        limit: Option<usize>,
    ) -> Result<Vec<QueueItem>, StoreError> {
        let items = self.items.lock();
        Ok(oldest_first(&items, filter)
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|i| items[i].clone())
            .collect())
    }

    async fn update_many(&self, filter: &ItemFilter, patch: ItemPatch) -> Result<u64, StoreError> {
        let mut items = self.items.lock();
        let mut updated = 0;
        for item in items.iter_mut().filter(|i| filter.matches(i)) {
            patch.clone().apply(item);
            updated += 1;
        }
        Ok(updated)
    }
}
