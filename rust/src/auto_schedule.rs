//! Date propagation through the dependency graph.
//!
//! Walks tasks in topological order and moves every derived (AUTO) task to
//! the earliest start its incoming edges allow, keeping its length.
//! Anchored (MANUAL) tasks are read but never written.

use thiserror::Error;

use crate::config::{BudgetExceeded, PassBudget};
use crate::constraints::{resolve_edge, Bounds, Span};
use crate::graph::{DependencyGraph, GraphError};
use crate::models::{DateOutOfRange, Placement};
use crate::store::{StoreError, TaskStore};
use crate::{log_changes, log_checks, log_debug};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutoScheduleError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error(transparent)]
    Date(#[from] DateOutOfRange),
}

/// Where a propagation pass starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin<'a> {
    /// `task` and its successor closure; `task` itself is left alone.
    From(&'a str),
    /// `task` and its successor closure, recomputing `task` too.
    Including(&'a str),
    /// Every task in the schedule.
    All,
}

/// Propagate dates from `origin`, returning the IDs of moved tasks in the
/// order they were moved.
pub fn auto_schedule(
    store: &mut TaskStore,
    graph: &DependencyGraph,
    origin: Origin<'_>,
    budget: &PassBudget,
    verbosity: u8,
) -> Result<Vec<String>, AutoScheduleError> {
    let (order, skip) = match origin {
        Origin::From(id) | Origin::Including(id) => {
            store.require(id)?;
            let scope = graph.successor_closure(id);
            let order = graph.topological_order(store, Some(&scope))?;
            let skip = matches!(origin, Origin::From(_)).then_some(id);
            (order, skip)
        }
        Origin::All => (graph.topological_order(store, None)?, None),
    };
    log_debug!(verbosity, "Auto-schedule order: {:?}", order);

    let mut moved = Vec::new();
    for id in &order {
        budget.check()?;
        if Some(id.as_str()) == skip {
            continue;
        }
        if reschedule_one(store, graph, id, verbosity)? {
            moved.push(id.clone());
        }
    }
    Ok(moved)
}

/// Recompute one task from its incoming edges. Returns whether it moved.
fn reschedule_one(
    store: &mut TaskStore,
    graph: &DependencyGraph,
    id: &str,
    verbosity: u8,
) -> Result<bool, AutoScheduleError> {
    let task = store.require(id)?;
    if task.scheduling_mode.placement() == Placement::Anchor {
        log_checks!(verbosity, "  Skipping anchor {}", id);
        return Ok(false);
    }

    let mut bounds = Bounds::default();
    for edge in graph.incoming(id) {
        let Some(predecessor) = store.get(&edge.predecessor_task_id) else {
            continue;
        };
        let bound = resolve_edge(edge, Span::of(predecessor)?)?;
        log_checks!(
            verbosity,
            "  {} -> {} ({}, lag {}): {:?}",
            edge.predecessor_task_id,
            id,
            edge.dependency_type,
            edge.lag_days,
            bound
        );
        bounds.push(bound);
    }

    let Some(start) = bounds.earliest_start(task.span_length())? else {
        return Ok(false);
    };
    if start == task.start_date {
        return Ok(false);
    }

    let task = store.require_mut(id)?;
    let previous = task.start_date;
    task.place_at(start)?;
    log_changes!(
        verbosity,
        "Rescheduled {}: {} -> {} (ends {})",
        id,
        previous,
        start,
        task.end_date
    );
    Ok(true)
}
