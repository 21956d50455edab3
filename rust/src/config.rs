//! Configuration types for the schedule network engine.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How much of the network is recomputed after an edge or task disappears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalRecompute {
    /// Re-run the auto-scheduler over the whole schedule.
    #[default]
    FullPass,
    /// Re-run only from the former successor(s).
    Scoped,
}

/// Configuration for engine operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
    /// Recompute strategy after dependency or task deletion.
    pub removal_recompute: RemovalRecompute,
    /// Wall-clock budget for one operation (None = unlimited).
    pub time_budget: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            removal_recompute: RemovalRecompute::FullPass,
            time_budget: None,
        }
    }
}

impl EngineConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_removal_recompute(mut self, removal_recompute: RemovalRecompute) -> Self {
        self.removal_recompute = removal_recompute;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Start the clock for one operation.
    pub fn start_budget(&self) -> PassBudget {
        PassBudget::new(self.time_budget)
    }
}

/// Raised when an operation runs past its wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation exceeded its time budget of {0:?}")]
pub struct BudgetExceeded(pub Duration);

/// Wall-clock budget shared by the passes of one operation.
#[derive(Debug, Clone, Copy)]
pub struct PassBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl PassBudget {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Fail once the elapsed time exceeds the limit.
    #[inline]
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => Err(BudgetExceeded(limit)),
            _ => Ok(()),
        }
    }
}
