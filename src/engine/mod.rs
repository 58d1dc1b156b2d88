//! The stage engine: one logical worker slot driven by a fixed-interval tick.
//!
//! Each tick either claims work (adopting an orphan first, then the oldest
//! PENDING item), or drives the held item one step: restart its stage,
//! advance past an elapsed deadline, or refresh its progress. Completion
//! hands the item to the callback path and frees the slot.
//!
//! Cross-instance exclusivity comes entirely from the store's conditional
//! update; every write to an owned item re-checks `status = PROCESSING` and
//! `locked_by = self`.

mod callback;
mod query;
mod tick;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::queue::{QueueItem, StagePlan};
use crate::store::ItemStore;

pub use callback::CallbackOutcome;
pub use query::{EngineStatus, QueuePosition};

/// Timing knobs resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub jitter_ratio: f64,
    pub callback_timeout: Duration,
    pub max_callback_tries: u32,
    pub callback_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            jitter_ratio: 0.15,
            callback_timeout: Duration::from_secs(5),
            max_callback_tries: 3,
            callback_backoff: Duration::from_secs(5),
        }
    }
}

/// A completion callback waiting for its next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRetry {
    pub item_id: String,
    pub due_at: DateTime<Utc>,
}

/// Per-instance slot state carried from one tick to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub active: Option<String>,
    pub stage_deadline: Option<DateTime<Utc>>,
    pub callbacks: Vec<CallbackRetry>,
}

impl Cursor {
    fn release(&mut self) {
        self.active = None;
        self.stage_deadline = None;
    }
}

/// What a single tick did with the worker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Adopted { item_id: String },
    Claimed { item_id: String },
    StageStarted { item_id: String, stage: String },
    Progressed { item_id: String, progress: u8 },
    Completed { item_id: String, callback: CallbackOutcome },
    OwnershipLost { item_id: String },
}

struct Runner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct StageEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    plan: StagePlan,
    settings: EngineSettings,
    node_id: String,
    cursor: AsyncMutex<Cursor>,
    runner: Mutex<Option<Runner>>,
}

impl<S, N> StageEngine<S, N>
where
    S: ItemStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, plan: StagePlan, settings: EngineSettings) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            plan,
            settings,
            node_id: format!("sim-{}", &suffix[..6]),
            cursor: AsyncMutex::new(Cursor::default()),
            runner: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Snapshot of the slot state.
    pub async fn cursor(&self) -> Cursor {
        self.cursor.lock().await.clone()
    }

    /// Validate and persist a new PENDING item.
    pub async fn enqueue(
        &self,
        payload: serde_json::Value,
        callback_url: &str,
    ) -> Result<QueueItem, EngineError> {
        let item = QueueItem::new(payload, callback_url, self.clock.now())?;
        self.store.insert(item.clone()).await?;
        debug!(item_id = %item.id, "item enqueued");
        Ok(item)
    }

    /// Begin ticking on the current tokio runtime. No-op while running.
    pub fn start(self: &Arc<Self>) {
        let mut runner = self.runner.lock();
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let token = CancellationToken::new();
        let engine = Arc::clone(self);
        let child = token.clone();
        let handle = tokio::spawn(async move { engine.run_loop(child).await });
        *runner = Some(Runner { token, handle });

        info!(node = %self.node_id, interval_ms = self.settings.tick_interval.as_millis() as u64, "engine started");
    }

    /// Stop scheduling ticks. A tick already running finishes its writes.
    pub fn stop(&self) {
        if let Some(runner) = self.runner.lock().take() {
            runner.token.cancel();
            info!(node = %self.node_id, "engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    async fn run_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.tick().await {
                error!(node = %self.node_id, error = %e, "tick failed, retrying next interval");
            }
        }
    }

    /// Run one tick. Ticks never overlap: a concurrent call waits for the
    /// running one to finish.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let mut cursor = self.cursor.lock().await;
        self.step(&mut cursor).await
    }
}
