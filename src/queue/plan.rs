use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Longest nominal duration a single stage may have: one week.
pub const MAX_STAGE_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// One named phase of the pipeline and its nominal duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub base_ms: u64,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, base_ms: u64) -> Self {
        Self {
            name: name.into(),
            base_ms,
        }
    }
}

/// The ordered stage sequence. The last stage is terminal: entering it
/// completes the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<StageSpec>,
}

impl StagePlan {
    /// Requires at least two stages with unique, non-empty names, none longer
    /// than [`MAX_STAGE_MS`].
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, EngineError> {
        if stages.len() < 2 {
            return Err(EngineError::Config(
                "pipeline needs at least one working stage and a terminal stage".into(),
            ));
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(EngineError::Config("stage names must not be empty".into()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "stage {:?} appears more than once",
                    stage.name
                )));
            }
            if stage.base_ms > MAX_STAGE_MS {
                return Err(EngineError::Config(format!(
                    "stage {:?} lasts {}ms, above the {MAX_STAGE_MS}ms limit",
                    stage.name, stage.base_ms
                )));
            }
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn first(&self) -> &StageSpec {
        &self.stages[0]
    }

    pub fn terminal(&self) -> &StageSpec {
        &self.stages[self.stages.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminal().name == name
    }

    /// The stage after `name`; `None` for the terminal stage or an unknown name.
    pub fn next_after(&self, name: &str) -> Option<&StageSpec> {
        let idx = self.stages.iter().position(|s| s.name == name)?;
        self.stages.get(idx + 1)
    }

    /// Nominal (un-jittered) pipeline length.
    pub fn total_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.base_ms).sum()
    }

    pub fn total_seconds(&self) -> u64 {
        (self.total_ms() + 500) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> StagePlan {
        StagePlan::new(vec![
            StageSpec::new("queued", 0),
            StageSpec::new("producing", 60_000),
            StageSpec::new("shipping", 1_400),
            StageSpec::new("delivered", 0),
        ])
        .unwrap()
    }

    #[test]
    fn structural_lookups() {
        let plan = plan();
        assert_eq!(plan.first().name, "queued");
        assert_eq!(plan.terminal().name, "delivered");
        assert!(plan.is_terminal("delivered"));
        assert!(!plan.is_terminal("shipping"));
        assert_eq!(plan.next_after("queued").unwrap().name, "producing");
        assert_eq!(plan.next_after("shipping").unwrap().name, "delivered");
        assert!(plan.next_after("delivered").is_none());
        assert!(plan.next_after("painting").is_none());
    }

    #[test]
    fn totals() {
        let plan = plan();
        assert_eq!(plan.total_ms(), 61_400);
        assert_eq!(plan.total_seconds(), 61);
    }

    #[test]
    fn rejects_short_plans() {
        assert!(StagePlan::new(vec![]).is_err());
        assert!(StagePlan::new(vec![StageSpec::new("only", 10)]).is_err());
    }

    #[test]
    fn rejects_duplicate_and_blank_names() {
        let dup = StagePlan::new(vec![StageSpec::new("a", 1), StageSpec::new("a", 2)]);
        assert!(matches!(dup, Err(EngineError::Config(_))));

        let blank = StagePlan::new(vec![StageSpec::new(" ", 1), StageSpec::new("b", 2)]);
        assert!(matches!(blank, Err(EngineError::Config(_))));
    }

    #[test]
    fn rejects_stages_longer_than_the_limit() {
        let at_limit = StagePlan::new(vec![
            StageSpec::new("long", MAX_STAGE_MS),
            StageSpec::new("done", 0),
        ]);
        assert!(at_limit.is_ok());

        let beyond = StagePlan::new(vec![
            StageSpec::new("long", MAX_STAGE_MS + 1),
            StageSpec::new("done", 0),
        ]);
        assert!(matches!(beyond, Err(EngineError::Config(_))));

        let absurd = StagePlan::new(vec![StageSpec::new("a", u64::MAX), StageSpec::new("b", 0)]);
        assert!(absurd.is_err());
    }
}
