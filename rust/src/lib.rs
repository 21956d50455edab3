//! Schedule network engine: task hierarchy, typed dependencies with lag,
//! date propagation and critical path analysis.
//!
//! [`Schedule`] runs operations over one loaded schedule;
//! [`ScheduleEngine`] wraps it with repository load/save and per-schedule
//! locking.

pub mod auto_schedule;
mod config;
pub mod constraints;
pub mod critical_path;
mod engine;
pub mod graph;
pub mod hierarchy;
mod interner;
pub mod logging;
mod models;
pub mod repository;
mod schedule;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use auto_schedule::{auto_schedule, AutoScheduleError, Origin};
pub use config::{BudgetExceeded, EngineConfig, PassBudget, RemovalRecompute};
pub use critical_path::{calculate_critical_path, CriticalPathError, CriticalPathResult, TaskTiming};
pub use engine::{EngineError, ScheduleEngine};
pub use graph::{DependencyGraph, GraphError};
pub use hierarchy::{HierarchyError, WbsCode};
pub use models::{
    shift_days, Baseline, ChildPolicy, CpmFields, DateOutOfRange, Dependency, DependencyType,
    NewTask, ParseEnumError, Placement, SchedulingMode, Task, TaskStatus, TaskUpdate,
};
pub use repository::{
    ChangeSet, InMemoryRepository, RepositoryError, ScheduleRepository, ScheduleSnapshot,
};
pub use schedule::{validate_task, DeleteOutcome, Schedule, ScheduleError};
pub use store::{StoreError, TaskStore};
