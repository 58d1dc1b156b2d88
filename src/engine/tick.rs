use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::{Cursor, StageEngine, TickOutcome};
use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::progress::{self, MAX_LIVE_PROGRESS};
use crate::queue::{ItemStatus, QueueItem, StageRecord, StageSpec};
use crate::store::{ItemFilter, ItemPatch, ItemStore};
use crate::timing::compute_duration;

impl<S, N> StageEngine<S, N>
where
    S: ItemStore + 'static,
    N: Notifier + 'static,
{
    pub(super) async fn step(&self, cursor: &mut Cursor) -> Result<TickOutcome, EngineError> {
        let now = self.clock.now();
        self.drain_callbacks(cursor, now).await;

        match cursor.active.clone() {
            None => self.acquire(cursor, now).await,
            Some(item_id) => self.drive(cursor, item_id, now).await,
        }
    }

    /// Fill the empty slot: an orphan first, otherwise the oldest PENDING item.
    async fn acquire(&self, cursor: &mut Cursor, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let orphans = ItemFilter::with_status(ItemStatus::Processing).unlocked();
        let adopt = ItemPatch::lock(self.node_id.as_str(), now);
        if let Some(item) = self.store.find_one_and_update(&orphans, adopt).await? {
            info!(node = %self.node_id, item_id = %item.id, stage = ?item.stage, "adopted orphaned item");
            cursor.active = Some(item.id.clone());
            // The deadline is recomputed by the next tick.
            cursor.stage_deadline = None;
            return Ok(TickOutcome::Adopted { item_id: item.id });
        }

        let first = self.plan.first();
        let claim = ItemPatch {
            status: Some(ItemStatus::Processing),
            stage: Some(Some(first.name.clone())),
            progress: Some(0),
            eta_seconds: Some(Some(self.plan.total_seconds())),
            stage_started_at: Some(Some(now)),
            history: Some(vec![StageRecord::open(first.name.as_str(), now)]),
            ..ItemPatch::lock(self.node_id.as_str(), now)
        };
        let pending = ItemFilter::with_status(ItemStatus::Pending);
        let Some(item) = self.store.find_one_and_update(&pending, claim).await? else {
            return Ok(TickOutcome::Idle);
        };

        cursor.active = Some(item.id.clone());
        cursor.stage_deadline = Some(self.deadline_for(first, now));
        info!(node = %self.node_id, item_id = %item.id, stage = %first.name, "claimed item");
        Ok(TickOutcome::Claimed { item_id: item.id })
    }

    async fn drive(
        &self,
        cursor: &mut Cursor,
        item_id: String,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        let mut item = match self.store.find_by_id(&item_id).await? {
            Some(item) if item.is_owned_by(&self.node_id) => item,
            _ => return Ok(self.lose(cursor, item_id)),
        };

        let Some(stage) = item.stage.as_deref().and_then(|s| self.plan.get(s)).cloned() else {
            // No usable stage to resume: start the pipeline over, keeping the lock.
            let first = self.plan.first().clone();
            warn!(node = %self.node_id, item_id = %item.id, stage = ?item.stage, restart_at = %first.name, "active item has no known stage, restarting pipeline");
            for open in item.history.iter_mut().filter(|r| r.is_open()) {
                open.finished_at = Some(now);
            }
            item.stage = Some(first.name.clone());
            return self.restart_stage(cursor, item, &first, now).await;
        };

        match cursor.stage_deadline {
            None => self.restart_stage(cursor, item, &stage, now).await,
            Some(deadline) if now >= deadline => self.advance(cursor, item, &stage, now).await,
            Some(_) => self.refresh(cursor, item, now).await,
        }
    }

    /// Resume the item's current stage after adoption. Never duplicates an
    /// open history entry.
    async fn restart_stage(
        &self,
        cursor: &mut Cursor,
        mut item: QueueItem,
        stage: &StageSpec,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        item.stage_started_at = Some(now);
        if !item
            .history
            .iter()
            .any(|r| r.stage == stage.name && r.is_open())
        {
            item.history.push(StageRecord::open(stage.name.as_str(), now));
        }
        self.project_into(&mut item, now);

        if !self.persist_owned(&item).await? {
            return Ok(self.lose(cursor, item.id));
        }
        cursor.stage_deadline = Some(self.deadline_for(stage, now));
        debug!(node = %self.node_id, item_id = %item.id, stage = %stage.name, progress = item.progress, "stage restarted");

        Ok(TickOutcome::StageStarted {
            item_id: item.id,
            stage: stage.name.clone(),
        })
    }

    async fn advance(
        &self,
        cursor: &mut Cursor,
        mut item: QueueItem,
        stage: &StageSpec,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        if let Some(open) = item.history.last_mut().filter(|r| r.is_open()) {
            open.finished_at = Some(now);
        }

        let next = match self.plan.next_after(&stage.name) {
            Some(next) if !self.plan.is_terminal(&next.name) => next.clone(),
            _ => return self.complete(cursor, item, now).await,
        };

        if !self.persist_owned(&item).await? {
            return Ok(self.lose(cursor, item.id));
        }

        item.stage = Some(next.name.clone());
        item.stage_started_at = Some(now);
        item.history.push(StageRecord::open(next.name.as_str(), now));
        self.project_into(&mut item, now);

        if !self.persist_owned(&item).await? {
            return Ok(self.lose(cursor, item.id));
        }
        cursor.stage_deadline = Some(self.deadline_for(&next, now));
        info!(node = %self.node_id, item_id = %item.id, from = %stage.name, to = %next.name, progress = item.progress, "stage advanced");

        Ok(TickOutcome::StageStarted {
            item_id: item.id,
            stage: next.name,
        })
    }

    async fn complete(
        &self,
        cursor: &mut Cursor,
        mut item: QueueItem,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        let terminal = self.plan.terminal().name.clone();
        if item.history.last().is_none_or(|r| r.stage != terminal) {
            item.history.push(StageRecord {
                stage: terminal.clone(),
                started_at: now,
                finished_at: Some(now),
            });
        }
        item.status = ItemStatus::Completed;
        item.stage = Some(terminal);
        item.stage_started_at = Some(now);
        item.progress = 100;
        item.eta_seconds = Some(0);

        if !self.persist_owned(&item).await? {
            return Ok(self.lose(cursor, item.id));
        }
        // The slot frees up whatever the callback does.
        cursor.release();
        info!(node = %self.node_id, item_id = %item.id, "item completed");

        let callback = self.notify_and_schedule(cursor, &mut item, now).await;
        Ok(TickOutcome::Completed {
            item_id: item.id,
            callback,
        })
    }

    async fn refresh(
        &self,
        cursor: &mut Cursor,
        mut item: QueueItem,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, EngineError> {
        self.project_into(&mut item, now);
        if !self.persist_owned(&item).await? {
            return Ok(self.lose(cursor, item.id));
        }
        Ok(TickOutcome::Progressed {
            item_id: item.id,
            progress: item.progress,
        })
    }

    fn lose(&self, cursor: &mut Cursor, item_id: String) -> TickOutcome {
        cursor.release();
        warn!(node = %self.node_id, item_id = %item_id, "lost ownership of active item, releasing slot");
        TickOutcome::OwnershipLost { item_id }
    }

    fn project_into(&self, item: &mut QueueItem, now: DateTime<Utc>) {
        let projection = progress::project(
            &item.history,
            item.stage.as_deref(),
            self.plan.total_ms(),
            now,
        );
        item.progress = projection.progress.max(item.progress).min(MAX_LIVE_PROGRESS);
        item.eta_seconds = Some(projection.eta_seconds);
    }

    fn deadline_for(&self, stage: &StageSpec, from: DateTime<Utc>) -> DateTime<Utc> {
        let ms = compute_duration(stage.base_ms, self.settings.jitter_ratio);
        i64::try_from(ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|delta| from.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Write the pipeline fields back, only while this instance still owns
    /// the item. `false` means ownership was lost underneath us.
    async fn persist_owned(&self, item: &QueueItem) -> Result<bool, EngineError> {
        let filter = ItemFilter::default()
            .id(item.id.as_str())
            .status(ItemStatus::Processing)
            .held_by(self.node_id.as_str());
        let updated = self
            .store
            .find_one_and_update(&filter, ItemPatch::pipeline_state(item))
            .await?;
        Ok(updated.is_some())
    }
}
