//! stageline: a single-lane production queue.
//!
//! Items wait in a shared [`store`], get claimed one at a time by a
//! [`engine::StageEngine`], pass through a fixed sequence of timed stages
//! and, once finished, are reported to their callback URL by a
//! [`notifier::Notifier`]. Several engines may share one store; the store's
//! conditional update keeps each item with a single owner.

pub mod admin;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod progress;
pub mod queue;
pub mod store;
pub mod timing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StagelineConfig;
pub use engine::{EngineSettings, EngineStatus, QueuePosition, StageEngine, TickOutcome};
pub use error::{EngineError, StoreError};
pub use notifier::{CompletionPayload, HttpNotifier, LogNotifier, Notifier, NotifyError};
pub use queue::{ItemStatus, QueueItem, StagePlan, StageSpec};
pub use store::{ItemStore, MemoryStore};
