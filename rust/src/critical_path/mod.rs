//! Critical path method over a whole schedule.
//!
//! Runs a forward pass for early placement and a backward pass for late
//! placement, then derives total float, free float and criticality. Unlike
//! the auto-scheduler it only runs when asked.

mod calculation;
mod types;

pub use calculation::{calculate_critical_path, CriticalPathError};
pub use types::{CriticalPathResult, TaskTiming};
