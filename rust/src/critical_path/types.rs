//! Types for critical path calculation.

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::CpmFields;
use crate::store::TaskStore;

/// Per-task timing from the forward and backward passes.
///
/// Finishes are exclusive: a 2-day task with `early_start` on day 1 has
/// `early_finish` on day 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskTiming {
    /// Earliest possible start (forward pass).
    pub early_start: NaiveDate,
    /// Earliest possible finish (forward pass).
    pub early_finish: NaiveDate,
    /// Latest allowable start (backward pass).
    pub late_start: NaiveDate,
    /// Latest allowable finish (backward pass).
    pub late_finish: NaiveDate,
    /// Days the start can slip without moving the project finish.
    pub total_float: i64,
    /// Days the start can slip without moving any successor.
    pub free_float: i64,
}

impl TaskTiming {
    pub fn is_critical(&self) -> bool {
        self.total_float == 0
    }

    pub fn to_fields(&self) -> CpmFields {
        CpmFields {
            early_start: Some(self.early_start),
            early_finish: Some(self.early_finish),
            late_start: Some(self.late_start),
            late_finish: Some(self.late_finish),
            total_float: Some(self.total_float),
            free_float: Some(self.free_float),
            is_critical_path: Some(self.is_critical()),
        }
    }
}

/// Result of a critical path run over a whole schedule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CriticalPathResult {
    /// Timing for every task, keyed by task ID.
    pub task_timings: FxHashMap<String, TaskTiming>,
    /// Critical task IDs in topological order.
    pub critical_path_tasks: Vec<String>,
    /// Edges between critical tasks that leave no gap, keyed as
    /// (predecessor, successor).
    pub driving_edges: Vec<(String, String)>,
    /// Earliest early start over all tasks.
    pub project_start: Option<NaiveDate>,
    /// Latest early finish over all tasks (exclusive).
    pub project_finish: Option<NaiveDate>,
}

impl CriticalPathResult {
    pub fn timing(&self, task_id: &str) -> Option<&TaskTiming> {
        self.task_timings.get(task_id)
    }

    pub fn is_critical(&self, task_id: &str) -> bool {
        self.timing(task_id).is_some_and(TaskTiming::is_critical)
    }

    /// Project length in days.
    pub fn duration_days(&self) -> i64 {
        match (self.project_start, self.project_finish) {
            (Some(start), Some(finish)) => (finish - start).num_days(),
            _ => 0,
        }
    }

    /// Write CPM fields onto the stored tasks. Returns IDs whose fields changed.
    pub fn apply(&self, store: &mut TaskStore) -> Vec<String> {
        let mut changed = Vec::new();
        for task in store.all_mut() {
            let fields = self
                .task_timings
                .get(&task.id)
                .map(TaskTiming::to_fields)
                .unwrap_or_default();
            if task.cpm != fields {
                task.cpm = fields;
                changed.push(task.id.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Chains of critical tasks linked by driving edges, from a task with no
    /// driving predecessor to one with no driving successor. Enumeration
    /// stops after `limit` chains.
    pub fn critical_chains(&self, limit: usize) -> Vec<Vec<String>> {
        let mut next: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        let mut has_driver: FxHashSet<&str> = FxHashSet::default();
        for (pred, succ) in &self.driving_edges {
            next.entry(pred.as_str()).or_default().push(succ.as_str());
            has_driver.insert(succ.as_str());
        }
        for successors in next.values_mut() {
            successors.sort_by_key(|id| self.position(id));
        }

        let mut chains = Vec::new();
        let heads = self
            .critical_path_tasks
            .iter()
            .map(String::as_str)
            .filter(|id| !has_driver.contains(id));
        for head in heads {
            let mut stack: Vec<Vec<&str>> = vec![vec![head]];
            while let Some(path) = stack.pop() {
                if chains.len() >= limit {
                    return chains;
                }
                let Some(&last) = path.last() else {
                    continue;
                };
                match next.get(last) {
                    Some(successors) if !successors.is_empty() => {
                        for succ in successors.iter().rev() {
                            let mut extended = path.clone();
                            extended.push(succ);
                            stack.push(extended);
                        }
                    }
                    _ => chains.push(path.iter().map(|s| s.to_string()).collect()),
                }
            }
        }
        chains
    }

    fn position(&self, id: &str) -> usize {
        self.critical_path_tasks
            .iter()
            .position(|t| t == id)
            .unwrap_or(usize::MAX)
    }
}
