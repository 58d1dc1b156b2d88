use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::{CallbackRetry, Cursor, StageEngine};
use crate::error::EngineError;
use crate::notifier::{CompletionPayload, Notifier};
use crate::queue::{ItemStatus, QueueItem};
use crate::store::{ItemFilter, ItemPatch, ItemStore};

/// Result of one pass through the completion callback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Delivered,
    /// `last_callback_at` was already set; nothing was sent.
    AlreadyDelivered,
    RetryScheduled {
        tries: u32,
        retry_at: DateTime<Utc>,
    },
    /// The try budget is spent; the item stays COMPLETED.
    GaveUp { tries: u32 },
    NotCompleted,
}

impl<S, N> StageEngine<S, N>
where
    S: ItemStore + 'static,
    N: Notifier + 'static,
{
    /// Run the completion callback for `item_id` once. Items already notified
    /// or out of tries are left alone. No retry is scheduled on failure; the
    /// outcome tells the caller when one would be due.
    pub async fn notify_completion(&self, item_id: &str) -> Result<CallbackOutcome, EngineError> {
        let now = self.clock.now();
        let mut item = self
            .store
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
        self.attempt_callback(&mut item, now).await
    }

    /// Attempt delivery and queue a retry in the cursor when one is due.
    pub(super) async fn notify_and_schedule(
        &self,
        cursor: &mut Cursor,
        item: &mut QueueItem,
        now: DateTime<Utc>,
    ) -> CallbackOutcome {
        let outcome = match self.attempt_callback(item, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Bookkeeping could not be written; try the whole pass again.
                let retry_at = self.retry_at(now);
                warn!(node = %self.node_id, item_id = %item.id, error = %e, "callback bookkeeping failed");
                CallbackOutcome::RetryScheduled {
                    tries: item.callback_tries,
                    retry_at,
                }
            }
        };

        if let CallbackOutcome::RetryScheduled { retry_at, .. } = outcome {
            cursor.callbacks.push(CallbackRetry {
                item_id: item.id.clone(),
                due_at: retry_at,
            });
        }
        outcome
    }

    /// Re-attempt every callback whose retry time has come.
    pub(super) async fn drain_callbacks(&self, cursor: &mut Cursor, now: DateTime<Utc>) {
        if cursor.callbacks.is_empty() {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut cursor.callbacks)
            .into_iter()
            .partition(|r| r.due_at <= now);
        cursor.callbacks = waiting;

        for retry in due {
            let mut item = match self.store.find_by_id(&retry.item_id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    debug!(item_id = %retry.item_id, "callback target no longer exists");
                    continue;
                }
                Err(e) => {
                    warn!(item_id = %retry.item_id, error = %e, "could not load item for callback retry");
                    cursor.callbacks.push(CallbackRetry {
                        item_id: retry.item_id,
                        due_at: self.retry_at(now),
                    });
                    continue;
                }
            };
            self.notify_and_schedule(cursor, &mut item, now).await;
        }
    }

    async fn attempt_callback(
        &self,
        item: &mut QueueItem,
        now: DateTime<Utc>,
    ) -> Result<CallbackOutcome, EngineError> {
        if item.status != ItemStatus::Completed {
            return Ok(CallbackOutcome::NotCompleted);
        }
        if item.last_callback_at.is_some() {
            return Ok(CallbackOutcome::AlreadyDelivered);
        }
        let max = self.settings.max_callback_tries;
        if item.callback_tries >= max {
            return Ok(CallbackOutcome::GaveUp {
                tries: item.callback_tries,
            });
        }

        let payload = CompletionPayload::from_item(item, now);
        let result = self
            .notifier
            .deliver(&item.callback_url, &payload, self.settings.callback_timeout)
            .await;

        match result {
            Ok(()) => {
                item.last_callback_at = Some(now);
                self.persist_callback(item).await?;
                info!(node = %self.node_id, item_id = %item.id, "completion callback delivered");
                Ok(CallbackOutcome::Delivered)
            }
            Err(e) => {
                item.callback_tries += 1;
                self.persist_callback(item).await?;
                let tries = item.callback_tries;
                if tries < max {
                    let retry_at = self.retry_at(now);
                    warn!(node = %self.node_id, item_id = %item.id, tries, max, error = %e, %retry_at, "completion callback failed, will retry");
                    Ok(CallbackOutcome::RetryScheduled { tries, retry_at })
                } else {
                    warn!(node = %self.node_id, item_id = %item.id, tries, error = %e, "completion callback failed, giving up");
                    Ok(CallbackOutcome::GaveUp { tries })
                }
            }
        }
    }

    async fn persist_callback(&self, item: &QueueItem) -> Result<(), EngineError> {
        let filter = ItemFilter::default()
            .id(item.id.as_str())
            .status(ItemStatus::Completed);
        let updated = self
            .store
            .find_one_and_update(&filter, ItemPatch::callback_state(item))
            .await?;
        if updated.is_none() {
            debug!(item_id = %item.id, "item left COMPLETED before callback bookkeeping was written");
        }
        Ok(())
    }

    fn retry_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let backoff =
            TimeDelta::from_std(self.settings.callback_backoff).unwrap_or(TimeDelta::seconds(5));
        now + backoff
    }
}
