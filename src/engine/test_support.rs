//! Shared fixtures for the engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use parking_lot::Mutex;
use serde_json::json;

pub use crate::clock::{Clock, ManualClock};
use super::{CallbackOutcome, EngineSettings, StageEngine, TickOutcome};
use crate::error::StoreError;
use crate::notifier::{CompletionPayload, Notifier, NotifyError};
use crate::queue::{QueueItem, StagePlan, StageSpec};
use crate::store::{ItemFilter, ItemPatch, ItemStore, MemoryStore};

pub const NODE_A: &str = "sim-aaaaaa";
pub const NODE_B: &str = "sim-bbbbbb";
pub const CALLBACK_URL: &str = "http://localhost:3333/callback";
pub const MAX_TRIES: u32 = 3;
pub const BACKOFF_MS: u64 = 5_000;

/// 12s nominal pipeline with two zero-length stages.
pub fn fixture_plan() -> StagePlan {
    StagePlan::new(vec![
        StageSpec::new("queued", 0),
        StageSpec::new("producing", 10_000),
        StageSpec::new("shipping", 2_000),
        StageSpec::new("delivered", 0),
    ])
    .unwrap()
}

/// No jitter, so deadlines land exactly on the nominal durations.
pub fn fixture_settings() -> EngineSettings {
    EngineSettings {
        tick_interval: Duration::from_millis(10),
        jitter_ratio: 0.0,
        callback_timeout: Duration::from_millis(100),
        max_callback_tries: MAX_TRIES,
        callback_backoff: Duration::from_millis(BACKOFF_MS),
    }
}

/// Records every delivery and fails the first `fail_first` of them.
#[derive(Debug, Default)]
pub struct ScriptedNotifier {
    fail_first: u32,
    attempts: AtomicU32,
    sent: Mutex<Vec<(String, CompletionPayload)>>,
}

impl ScriptedNotifier {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> usize {
        self.attempts.load(Ordering::SeqCst) as usize
    }

    pub fn payloads(&self) -> Vec<(String, CompletionPayload)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn deliver(
        &self,
        url: &str,
        payload: &CompletionPayload,
        _timeout: Duration,
    ) -> Result<(), NotifyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push((url.to_string(), payload.clone()));
        if attempt < self.fail_first {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

/// A memory store that can be switched off.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for FlakyStore {
    async fn insert(&self, item: QueueItem) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert(item).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>, StoreError> {
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn find_one_and_update(
        &self,
        filter: &ItemFilter,
        patch: ItemPatch,
    ) -> Result<Option<QueueItem>, StoreError> {
        self.check()?;
        self.inner.find_one_and_update(filter, patch).await
    }

    async fn count(&self, filter: &ItemFilter) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.count(filter).await
    }

    async fn find(
        &self,
        filter: &ItemFilter,
        limit: Option<usize>,
    ) -> Result<Vec<QueueItem>, StoreError> {
        self.check()?;
        self.inner.find(filter, limit).await
    }

    async fn update_many(&self, filter: &ItemFilter, patch: ItemPatch) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.update_many(filter, patch).await
    }
}

pub type TestEngine = StageEngine<MemoryStore, ScriptedNotifier>;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<ScriptedNotifier>,
    pub engine: Arc<TestEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(ScriptedNotifier::succeeding())
    }

    pub fn with_notifier(notifier: ScriptedNotifier) -> Self {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let engine = Arc::new(
            StageEngine::new(
                Arc::clone(&store),
                Arc::clone(&notifier),
                fixture_plan(),
                fixture_settings(),
            )
            .with_clock(clock.clone())
            .with_node_id(NODE_A),
        );
        Self {
            clock,
            store,
            notifier,
            engine,
        }
    }

    /// Another engine over the same store, clock and notifier.
    pub fn second_engine(&self, node_id: &str) -> TestEngine {
        StageEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            fixture_plan(),
            fixture_settings(),
        )
        .with_clock(self.clock.clone())
        .with_node_id(node_id)
    }

    /// Insert a PENDING item created `offset_ms` from the current clock.
    pub async fn pending_at(&self, offset_ms: i64) -> String {
        let created = self.clock.now() + TimeDelta::milliseconds(offset_ms);
        let item = QueueItem::new(json!({ "offset": offset_ms }), CALLBACK_URL, created).unwrap();
        let id = item.id.clone();
        self.store.insert(item).await.unwrap();
        id
    }

    pub async fn item(&self, id: &str) -> QueueItem {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }

    /// Tick in 500ms steps until the held item completes.
    pub async fn run_to_completion(&self) -> CallbackOutcome {
        for _ in 0..1_000 {
            self.clock.advance_ms(500);
            if let TickOutcome::Completed { callback, .. } = self.engine.tick().await.unwrap() {
                return callback;
            }
        }
        panic!("item did not complete");
    }
}
