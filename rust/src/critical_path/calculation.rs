//! Critical path calculation using forward and backward passes.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::{BudgetExceeded, PassBudget};
use crate::constraints::{resolve_backward, resolve_edge, Bounds, Span};
use crate::graph::{DependencyGraph, GraphError};
use crate::interner::TaskIndex;
use crate::models::{shift_days, DateOutOfRange};
use crate::store::TaskStore;
use crate::{log_changes, log_debug};

use super::types::{CriticalPathResult, TaskTiming};

/// Error types for critical path calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalPathError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error(transparent)]
    Date(#[from] DateOutOfRange),
}

/// Early placement computed by the forward pass.
#[derive(Clone, Copy)]
struct Early {
    span: Span,
    length: i64,
}

/// Calculate early/late placement, floats and criticality for every task.
///
/// Forward pass in topological order: a task without predecessors starts on
/// its own start date, any other task as early as all incoming edges allow.
/// Backward pass in reverse order, seeded with the latest early finish: a
/// task without successors must finish by then, any other task early enough
/// for every outgoing edge.
pub fn calculate_critical_path(
    store: &TaskStore,
    graph: &DependencyGraph,
    budget: &PassBudget,
    verbosity: u8,
) -> Result<CriticalPathResult, CriticalPathError> {
    let topo_order = graph.topological_order(store, None)?;
    if topo_order.is_empty() {
        return Ok(CriticalPathResult::default());
    }
    let index = TaskIndex::ranked(topo_order.iter().map(String::as_str));
    let n = index.len();

    // Forward pass
    let mut early: Vec<Option<Early>> = vec![None; n];
    for (idx, task_id) in topo_order.iter().enumerate() {
        budget.check()?;
        let Some(task) = store.get(task_id) else {
            continue;
        };
        let length = task.span_length();

        let mut bounds = Bounds::default();
        for edge in graph.incoming(task_id) {
            let pred = index
                .get(&edge.predecessor_task_id)
                .and_then(|p| early[p as usize]);
            if let Some(pred) = pred {
                bounds.push(resolve_edge(edge, pred.span)?);
            }
        }
        let early_start = bounds.earliest_start(length)?.unwrap_or(task.start_date);
        early[idx] = Some(Early {
            span: Span::new(early_start, length)?,
            length,
        });
    }

    let project_start = early.iter().flatten().map(|e| e.span.start).min();
    let Some(project_finish) = early.iter().flatten().map(|e| e.span.finish).max() else {
        return Ok(CriticalPathResult::default());
    };

    // Backward pass
    let mut late: Vec<Option<Span>> = vec![None; n];
    for (idx, task_id) in topo_order.iter().enumerate().rev() {
        budget.check()?;
        let Some(this) = early[idx] else {
            continue;
        };
        let mut late_finish: Option<NaiveDate> = None;
        for edge in graph.outgoing(task_id) {
            let succ_late = index
                .get(&edge.successor_task_id)
                .and_then(|s| late[s as usize]);
            if let Some(succ_late) = succ_late {
                let required =
                    resolve_backward(edge.dependency_type, edge.lag_days, succ_late, this.length)?;
                late_finish = Some(late_finish.map_or(required, |lf| lf.min(required)));
            }
        }
        let late_finish = late_finish.unwrap_or(project_finish);
        late[idx] = Some(Span {
            start: shift_days(late_finish, -this.length)?,
            finish: late_finish,
        });
    }

    // Floats
    let mut task_timings: FxHashMap<String, TaskTiming> =
        FxHashMap::with_capacity_and_hasher(n, Default::default());
    let mut critical_path_tasks = Vec::new();
    for (idx, task_id) in topo_order.iter().enumerate() {
        let (Some(this), Some(late_span)) = (early[idx], late[idx]) else {
            continue;
        };
        let total_float = (late_span.start - this.span.start).num_days();

        let mut free_float: Option<i64> = None;
        for edge in graph.outgoing(task_id) {
            let succ_early = index
                .get(&edge.successor_task_id)
                .and_then(|s| early[s as usize]);
            if let Some(succ_early) = succ_early {
                let gap = resolve_edge(edge, this.span)?.gap(succ_early.span);
                free_float = Some(free_float.map_or(gap, |ff| ff.min(gap)));
            }
        }
        let free_float = match free_float {
            Some(ff) => ff.clamp(0, total_float.max(0)),
            None => total_float.max(0),
        };

        let timing = TaskTiming {
            early_start: this.span.start,
            early_finish: this.span.finish,
            late_start: late_span.start,
            late_finish: late_span.finish,
            total_float,
            free_float,
        };
        log_debug!(
            verbosity,
            "  {}: ES={} EF={} LS={} LF={} TF={} FF={}",
            task_id,
            timing.early_start,
            timing.early_finish,
            timing.late_start,
            timing.late_finish,
            timing.total_float,
            timing.free_float
        );
        if timing.is_critical() {
            critical_path_tasks.push(task_id.clone());
        }
        task_timings.insert(task_id.clone(), timing);
    }

    // Driving edges between critical tasks
    let mut driving_edges = Vec::new();
    for edge in graph.edges() {
        let (Some(pred), Some(succ)) = (
            task_timings.get(&edge.predecessor_task_id),
            task_timings.get(&edge.successor_task_id),
        ) else {
            continue;
        };
        if !pred.is_critical() || !succ.is_critical() {
            continue;
        }
        let pred_span = Span {
            start: pred.early_start,
            finish: pred.early_finish,
        };
        let succ_span = Span {
            start: succ.early_start,
            finish: succ.early_finish,
        };
        if resolve_edge(edge, pred_span)?.gap(succ_span) == 0 {
            driving_edges.push((
                edge.predecessor_task_id.clone(),
                edge.successor_task_id.clone(),
            ));
        }
    }

    log_changes!(
        verbosity,
        "Critical path: {} of {} tasks critical, project {:?} -> {}",
        critical_path_tasks.len(),
        n,
        project_start,
        project_finish
    );

    Ok(CriticalPathResult {
        task_timings,
        critical_path_tasks,
        driving_edges,
        project_start,
        project_finish: Some(project_finish),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::recompute_codes;
    use crate::models::{Dependency, DependencyType, SchedulingMode, Task};
    use crate::store::test_support::*;

    fn build(tasks: Vec<Task>, edges: Vec<Dependency>) -> (TaskStore, DependencyGraph) {
        let mut tasks = tasks;
        for (i, task) in tasks.iter_mut().enumerate() {
            task.order_index = i as i32;
        }
        let mut store = TaskStore::from_tasks("sched", tasks).unwrap();
        recompute_codes(&mut store, None).unwrap();
        let mut graph = DependencyGraph::new();
        for edge in edges {
            graph.add_edge(edge, &store).unwrap();
        }
        (store, graph)
    }

    fn fs(id: &str, pred: &str, succ: &str, lag: i32) -> Dependency {
        Dependency::new(id, pred, succ, DependencyType::FinishToStart, lag)
    }

    fn cpm(store: &TaskStore, graph: &DependencyGraph) -> CriticalPathResult {
        calculate_critical_path(store, graph, &PassBudget::unlimited(), 0).unwrap()
    }

    #[test]
    fn test_chain_is_fully_critical() {
        // Three 2-day tasks, A starts day 1
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(2), SchedulingMode::Manual),
                make_task("b", day(1), day(2), SchedulingMode::Auto),
                make_task("c", day(1), day(2), SchedulingMode::Auto),
            ],
            vec![fs("e1", "a", "b", 0), fs("e2", "b", "c", 0)],
        );
        let result = cpm(&store, &graph);

        let a = result.timing("a").unwrap();
        let b = result.timing("b").unwrap();
        let c = result.timing("c").unwrap();
        assert_eq!((a.early_start, a.early_finish), (day(1), day(3)));
        assert_eq!((b.early_start, b.early_finish), (day(3), day(5)));
        assert_eq!((c.early_start, c.early_finish), (day(5), day(7)));
        for t in [a, b, c] {
            assert_eq!(t.total_float, 0);
            assert_eq!(t.free_float, 0);
        }
        assert_eq!(result.critical_path_tasks, vec!["a", "b", "c"]);
        assert_eq!(result.project_finish, Some(day(7)));
        assert_eq!(result.duration_days(), 6);
        assert_eq!(
            result.critical_chains(8),
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
        );
    }

    #[test]
    fn test_parallel_branch_has_float() {
        // a(3) -> b(5) -> d(1); a -> c(2) -> d
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(3), SchedulingMode::Manual),
                make_task("b", day(1), day(5), SchedulingMode::Auto),
                make_task("c", day(1), day(2), SchedulingMode::Auto),
                make_task("d", day(1), day(1), SchedulingMode::Auto),
            ],
            vec![
                fs("e1", "a", "b", 0),
                fs("e2", "a", "c", 0),
                fs("e3", "b", "d", 0),
                fs("e4", "c", "d", 0),
            ],
        );
        let result = cpm(&store, &graph);

        let c = result.timing("c").unwrap();
        assert_eq!(c.early_start, day(4));
        assert_eq!(c.late_start, day(7));
        assert_eq!(c.total_float, 3);
        assert_eq!(c.free_float, 3);
        assert!(!result.is_critical("c"));

        assert_eq!(result.critical_path_tasks, vec!["a", "b", "d"]);
        let d = result.timing("d").unwrap();
        assert_eq!(d.early_start, day(9));
        assert_eq!(result.project_finish, Some(day(10)));
        assert_eq!(
            result.critical_chains(8),
            vec![vec!["a".to_string(), "b".to_string(), "d".to_string()]]
        );
    }

    #[test]
    fn test_free_float_smaller_than_total_float() {
        // a(2) -> c(1) -> e(1); b(5) -> e. c has total float but
        // a has none free until c: a -> c with c starting right after a.
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(2), SchedulingMode::Manual),
                make_task("b", day(1), day(5), SchedulingMode::Manual),
                make_task("c", day(1), day(1), SchedulingMode::Auto),
                make_task("e", day(1), day(1), SchedulingMode::Auto),
            ],
            vec![
                fs("e1", "a", "c", 0),
                fs("e2", "c", "e", 0),
                fs("e3", "b", "e", 0),
            ],
        );
        let result = cpm(&store, &graph);

        let a = result.timing("a").unwrap();
        assert_eq!(a.total_float, 2);
        assert_eq!(a.free_float, 0);
        let c = result.timing("c").unwrap();
        assert_eq!(c.total_float, 2);
        assert_eq!(c.free_float, 2);
    }

    #[test]
    fn test_independent_task_without_edges() {
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(10), SchedulingMode::Manual),
                make_task("z", day(3), day(4), SchedulingMode::Manual),
            ],
            vec![],
        );
        let result = cpm(&store, &graph);
        let z = result.timing("z").unwrap();
        assert_eq!(z.early_start, day(3));
        assert_eq!(z.late_finish, day(11));
        assert_eq!(z.total_float, 6);
        assert_eq!(z.free_float, 6);
        assert!(result.is_critical("a"));
    }

    #[test]
    fn test_lag_and_edge_types_keep_floats_non_negative() {
        let mut milestone = make_task("m", day(1), day(1), SchedulingMode::Auto);
        milestone.is_milestone = true;
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(4), SchedulingMode::Manual),
                make_task("b", day(1), day(3), SchedulingMode::Auto),
                make_task("c", day(1), day(6), SchedulingMode::Auto),
                milestone,
            ],
            vec![
                Dependency::new("e1", "a", "b", DependencyType::StartToStart, 2),
                Dependency::new("e2", "a", "c", DependencyType::FinishToFinish, -1),
                Dependency::new("e3", "b", "m", DependencyType::FinishToStart, 3),
                Dependency::new("e4", "c", "m", DependencyType::StartToFinish, 0),
            ],
        );
        let result = cpm(&store, &graph);
        for (id, timing) in &result.task_timings {
            assert!(timing.total_float >= 0, "{id} total float");
            assert!(timing.free_float >= 0, "{id} free float");
            assert_eq!(timing.is_critical(), result.critical_path_tasks.contains(id));
        }
        let m = result.timing("m").unwrap();
        assert_eq!(m.early_start, m.early_finish);
        assert_eq!(m.early_start, day(9));
        // c only has to end the day before a ends
        assert_eq!(result.timing("c").unwrap().total_float, 11);
        assert_eq!(result.critical_path_tasks, vec!["a", "b", "m"]);
        assert_eq!(
            result.critical_chains(8),
            vec![vec!["a".to_string(), "b".to_string(), "m".to_string()]]
        );
    }

    #[test]
    fn test_task_at_calendar_end_is_an_error() {
        let (store, graph) = build(
            vec![make_task(
                "a",
                chrono::NaiveDate::MAX,
                chrono::NaiveDate::MAX,
                SchedulingMode::Manual,
            )],
            vec![],
        );
        let result = calculate_critical_path(&store, &graph, &PassBudget::unlimited(), 0);
        assert!(matches!(result, Err(CriticalPathError::Date(_))));
    }

    #[test]
    fn test_lag_past_calendar_end_is_an_error() {
        let (store, graph) = build(
            vec![
                make_task("a", day(1), day(3), SchedulingMode::Manual),
                make_task("b", day(4), day(6), SchedulingMode::Auto),
            ],
            vec![fs("e1", "a", "b", i32::MAX)],
        );
        let result = calculate_critical_path(&store, &graph, &PassBudget::unlimited(), 0);
        assert!(matches!(result, Err(CriticalPathError::Date(_))));
    }

    #[test]
    fn test_empty_schedule() {
        let store = TaskStore::new("sched");
        let graph = DependencyGraph::new();
        let result = cpm(&store, &graph);
        assert!(result.task_timings.is_empty());
        assert_eq!(result.project_finish, None);
    }

    #[test]
    fn test_apply_writes_fields() {
        let (mut store, graph) = build(
            vec![make_task("a", day(1), day(2), SchedulingMode::Manual)],
            vec![],
        );
        let result = cpm(&store, &graph);
        assert_eq!(result.apply(&mut store), vec!["a"]);
        let a = store.get("a").unwrap();
        assert_eq!(a.cpm.early_finish, Some(day(3)));
        assert_eq!(a.cpm.is_critical_path, Some(true));
        // Second application changes nothing
        assert!(result.apply(&mut store).is_empty());
    }
}
