mod item;
mod plan;

pub use item::{ItemStatus, QueueItem, StageRecord};
pub use plan::{StagePlan, StageSpec};
