//! Caller-facing operations over one loaded schedule.
//!
//! Every mutation validates first, then writes, then propagates dates. If
//! any step fails the schedule is restored to its state before the call.

use chrono::NaiveDate;
use thiserror::Error;

use crate::auto_schedule::{auto_schedule, AutoScheduleError, Origin};
use crate::config::{BudgetExceeded, EngineConfig, PassBudget, RemovalRecompute};
use crate::critical_path::{calculate_critical_path, CriticalPathError, CriticalPathResult};
use crate::graph::{DependencyGraph, GraphError};
use crate::hierarchy::{self, HierarchyError};
use crate::models::{
    ChildPolicy, CpmFields, DateOutOfRange, Dependency, NewTask, SchedulingMode, Task, TaskUpdate,
};
use crate::repository::ScheduleSnapshot;
use crate::store::{StoreError, TaskStore};
use crate::{log_changes, log_checks};

/// Errors that reject a requested mutation. None of them leave the schedule
/// partially modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid date range for task {task}: {start} to {end}")]
    InvalidDateRange {
        task: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Progress for task {task} must be within 0-100, got {progress}")]
    InvalidProgress { task: String, progress: u8 },
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error(transparent)]
    DateOutOfRange(#[from] DateOutOfRange),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

impl From<AutoScheduleError> for ScheduleError {
    fn from(err: AutoScheduleError) -> Self {
        match err {
            AutoScheduleError::Graph(GraphError::CycleDetected(ids)) => {
                ScheduleError::DataIntegrity(format!("dependency cycle among {:?}", ids))
            }
            AutoScheduleError::Graph(e) => ScheduleError::Graph(e),
            AutoScheduleError::Store(e) => ScheduleError::Store(e),
            AutoScheduleError::Budget(e) => ScheduleError::Budget(e),
            AutoScheduleError::Date(e) => ScheduleError::DateOutOfRange(e),
        }
    }
}

impl From<CriticalPathError> for ScheduleError {
    fn from(err: CriticalPathError) -> Self {
        match err {
            CriticalPathError::Graph(GraphError::CycleDetected(ids)) => {
                ScheduleError::DataIntegrity(format!("dependency cycle among {:?}", ids))
            }
            CriticalPathError::Graph(e) => ScheduleError::Graph(e),
            CriticalPathError::Budget(e) => ScheduleError::Budget(e),
            CriticalPathError::Date(e) => ScheduleError::DateOutOfRange(e),
        }
    }
}

/// Result of `delete_task`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteOutcome {
    pub removed: Option<Task>,
    pub removed_dependencies: Vec<Dependency>,
    pub rescheduled: Vec<String>,
}

/// One schedule's tasks and dependencies, loaded for an operation.
#[derive(Debug, Clone)]
pub struct Schedule {
    store: TaskStore,
    graph: DependencyGraph,
    config: EngineConfig,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl Schedule {
    pub fn new(schedule_id: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            store: TaskStore::new(schedule_id),
            graph: DependencyGraph::new(),
            config,
            start_date: None,
            end_date: None,
        }
    }

    /// Load from persisted records. A snapshot with a malformed task, a
    /// broken hierarchy or a broken edge set is reported as a data-integrity
    /// error, not repaired.
    pub fn from_snapshot(
        snapshot: ScheduleSnapshot,
        config: EngineConfig,
    ) -> Result<Self, ScheduleError> {
        let integrity = |e: &dyn std::fmt::Display| ScheduleError::DataIntegrity(e.to_string());

        for task in &snapshot.tasks {
            validate_task(task).map_err(|e| integrity(&e))?;
        }
        let store = TaskStore::from_tasks(snapshot.schedule_id, snapshot.tasks)
            .map_err(|e| integrity(&e))?;
        hierarchy::validate_tree(&store).map_err(|e| integrity(&e))?;
        let graph =
            DependencyGraph::from_edges(snapshot.dependencies).map_err(|e| integrity(&e))?;
        graph.validate(&store).map_err(|e| integrity(&e))?;

        Ok(Self {
            store,
            graph,
            config,
            start_date: snapshot.schedule_start_date,
            end_date: snapshot.schedule_end_date,
        })
    }

    /// Current state as persistable records, sorted by ID.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        let mut tasks: Vec<Task> = self.store.all().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        ScheduleSnapshot {
            schedule_id: self.store.schedule_id().to_string(),
            schedule_start_date: self.start_date,
            schedule_end_date: self.end_date,
            tasks,
            dependencies: self.graph.edges().into_iter().cloned().collect(),
        }
    }

    pub fn id(&self) -> &str {
        self.store.schedule_id()
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn task(&self, id: &str) -> Result<&Task, ScheduleError> {
        Ok(self.store.require(id)?)
    }

    /// Earliest start and latest end over all tasks.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.store.all().map(|t| t.start_date).min()?;
        let end = self.store.all().map(|t| t.end_date).max()?;
        Some((start, end))
    }

    /// Run `op`, restoring the previous state if it fails.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, ScheduleError>,
    ) -> Result<T, ScheduleError> {
        let store = self.store.clone();
        let graph = self.graph.clone();
        let result = op(self);
        if let Err(err) = &result {
            log_checks!(self.config.verbosity, "Rejected: {}", err);
            self.store = store;
            self.graph = graph;
        }
        result
    }

    fn propagate(
        &mut self,
        origin: Origin<'_>,
        budget: &PassBudget,
    ) -> Result<Vec<String>, ScheduleError> {
        Ok(auto_schedule(
            &mut self.store,
            &self.graph,
            origin,
            budget,
            self.config.verbosity,
        )?)
    }

    /// Insert a new task, place it among its siblings and refresh WBS codes.
    pub fn create_task(&mut self, new: NewTask) -> Result<Task, ScheduleError> {
        self.transact(|s| {
            let task = Task {
                id: new.id,
                schedule_id: s.store.schedule_id().to_string(),
                title: new.title,
                description: new.description,
                notes: new.notes,
                start_date: new.start_date,
                end_date: new.end_date,
                parent_task_id: new.parent_task_id,
                order_index: 0,
                wbs_code: String::new(),
                level: 0,
                scheduling_mode: new.scheduling_mode,
                is_milestone: new.is_milestone,
                status: new.status,
                progress: new.progress,
                cpm: CpmFields::default(),
                baseline: new.baseline,
            };
            validate_task(&task)?;
            if let Some(parent) = &task.parent_task_id {
                s.store.require(parent)?;
            }

            let id = task.id.clone();
            s.store.insert(task)?;
            hierarchy::place_among_siblings(&mut s.store, &id, new.order_index)?;
            hierarchy::recompute_codes(&mut s.store, None)?;
            log_changes!(s.config.verbosity, "Created task {}", id);
            Ok(s.store.require(&id)?.clone())
        })
    }

    /// Apply a partial update, then reshape the tree and propagate dates as
    /// needed. Returns the IDs of tasks moved by propagation.
    pub fn update_task(
        &mut self,
        id: &str,
        update: TaskUpdate,
    ) -> Result<Vec<String>, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| {
            let current = s.store.require(id)?;
            let previous_mode = current.scheduling_mode;
            let mut task = current.clone();

            if let Some(title) = update.title.clone() {
                task.title = title;
            }
            if let Some(description) = update.description.clone() {
                task.description = description;
            }
            if let Some(notes) = update.notes.clone() {
                task.notes = notes;
            }
            if let Some(start) = update.start_date {
                task.start_date = start;
            }
            if let Some(end) = update.end_date {
                task.end_date = end;
            }
            if let Some(mode) = update.scheduling_mode {
                task.scheduling_mode = mode;
            }
            if let Some(milestone) = update.is_milestone {
                task.is_milestone = milestone;
            }
            if let Some(status) = update.status {
                task.status = status;
            }
            if let Some(progress) = update.progress {
                task.progress = progress;
            }
            validate_task(&task)?;

            let parent_change = update.parent_task_id.clone();
            if let Some(parent) = &parent_change {
                hierarchy::check_parent(&s.store, id, parent.as_deref())?;
            }

            // Validated; write. Hierarchy fields are owned by the hierarchy module.
            let stored = s.store.require_mut(id)?;
            task.parent_task_id = stored.parent_task_id.clone();
            task.order_index = stored.order_index;
            *stored = task;

            if update.touches_hierarchy() {
                let parent = match parent_change {
                    Some(parent) => parent,
                    None => s.store.require(id)?.parent_task_id.clone(),
                };
                hierarchy::set_parent(&mut s.store, id, parent.as_deref(), update.order_index)?;
                hierarchy::recompute_codes(&mut s.store, None)?;
            }

            let now_mode = s.store.require(id)?.scheduling_mode;
            let origin = if now_mode == SchedulingMode::Auto && previous_mode != now_mode {
                Some(Origin::Including(id))
            } else if update.touches_dates() || previous_mode != now_mode {
                Some(Origin::From(id))
            } else {
                None
            };
            match origin {
                Some(origin) => s.propagate(origin, &budget),
                None => Ok(Vec::new()),
            }
        })
    }

    /// Remove a task, its edges, and re-home its children per `policy`.
    pub fn delete_task(
        &mut self,
        id: &str,
        policy: ChildPolicy,
    ) -> Result<DeleteOutcome, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| {
            let task = s.store.require(id)?;
            let old_parent = task.parent_task_id.clone();
            let destination = match &policy {
                ChildPolicy::Promote => None,
                ChildPolicy::LiftToParent => old_parent.clone(),
                ChildPolicy::Reparent(target) => Some(target.clone()),
            };
            let children: Vec<String> = s
                .store
                .children(Some(id))
                .into_iter()
                .map(|t| t.id.clone())
                .collect();
            if let Some(target) = &destination {
                if target == id {
                    return Err(HierarchyError::CircularHierarchy {
                        task: id.to_string(),
                        parent: target.clone(),
                    }
                    .into());
                }
                for child in &children {
                    hierarchy::check_parent(&s.store, child, Some(target))?;
                }
            }

            let removed_dependencies = s.graph.detach_task(id);
            let removed = s.store.remove(id);
            for child in &children {
                hierarchy::set_parent(&mut s.store, child, destination.as_deref(), None)?;
            }
            hierarchy::renumber_children(&mut s.store, old_parent.as_deref());
            hierarchy::recompute_codes(&mut s.store, None)?;
            log_changes!(
                s.config.verbosity,
                "Deleted task {} ({} edges, {} children re-homed)",
                id,
                removed_dependencies.len(),
                children.len()
            );

            let successors: Vec<String> = removed_dependencies
                .iter()
                .filter(|e| e.predecessor_task_id == id)
                .map(|e| e.successor_task_id.clone())
                .collect();
            let rescheduled = s.recompute_after_removal(&successors, &budget)?;
            Ok(DeleteOutcome {
                removed,
                removed_dependencies,
                rescheduled,
            })
        })
    }

    /// Validate and insert an edge, then propagate from its predecessor.
    pub fn add_dependency(&mut self, dependency: Dependency) -> Result<Vec<String>, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| {
            let predecessor = dependency.predecessor_task_id.clone();
            log_changes!(
                s.config.verbosity,
                "Adding {} -> {} ({}, lag {})",
                dependency.predecessor_task_id,
                dependency.successor_task_id,
                dependency.dependency_type,
                dependency.lag_days
            );
            s.graph.add_edge(dependency, &s.store)?;
            s.propagate(Origin::From(&predecessor), &budget)
        })
    }

    /// Remove an edge. Dates it already pushed stay where they are unless
    /// the recompute pass moves them.
    pub fn delete_dependency(
        &mut self,
        dependency_id: &str,
    ) -> Result<(Dependency, Vec<String>), ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| {
            let removed = s.graph.remove_edge(dependency_id)?;
            log_changes!(
                s.config.verbosity,
                "Removed {} -> {}",
                removed.predecessor_task_id,
                removed.successor_task_id
            );
            let rescheduled = s.recompute_after_removal(
                std::slice::from_ref(&removed.successor_task_id),
                &budget,
            )?;
            Ok((removed, rescheduled))
        })
    }

    fn recompute_after_removal(
        &mut self,
        former_successors: &[String],
        budget: &PassBudget,
    ) -> Result<Vec<String>, ScheduleError> {
        match self.config.removal_recompute {
            RemovalRecompute::FullPass => self.propagate(Origin::All, budget),
            RemovalRecompute::Scoped => {
                let mut moved = Vec::new();
                for successor in former_successors {
                    if self.store.contains(successor) {
                        moved.extend(self.propagate(Origin::Including(successor), budget)?);
                    }
                }
                Ok(moved)
            }
        }
    }

    /// Propagate from `id` through its successors; `id` itself stays put.
    pub fn auto_schedule_task(&mut self, id: &str) -> Result<Vec<String>, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| s.propagate(Origin::From(id), &budget))
    }

    /// Propagate over the whole schedule in one topological order.
    pub fn auto_schedule_all(&mut self) -> Result<Vec<String>, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| s.propagate(Origin::All, &budget))
    }

    /// Run the forward and backward passes and store the CPM fields.
    pub fn calculate_critical_path(&mut self) -> Result<CriticalPathResult, ScheduleError> {
        let budget = self.config.start_budget();
        self.transact(|s| {
            let result =
                calculate_critical_path(&s.store, &s.graph, &budget, s.config.verbosity)?;
            result.apply(&mut s.store);
            Ok(result)
        })
    }
}

/// Date range, milestone and progress checks for one task record.
pub fn validate_task(task: &Task) -> Result<(), ScheduleError> {
    let bad_range = task.end_date < task.start_date
        || (task.is_milestone && task.start_date != task.end_date);
    if bad_range {
        return Err(ScheduleError::InvalidDateRange {
            task: task.id.clone(),
            start: task.start_date,
            end: task.end_date,
        });
    }
    if task.progress > 100 {
        return Err(ScheduleError::InvalidProgress {
            task: task.id.clone(),
            progress: task.progress,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencyType, TaskStatus};
    use crate::store::test_support::day;

    fn schedule() -> Schedule {
        Schedule::new("sched", EngineConfig::default())
    }

    fn add(s: &mut Schedule, id: &str, start: u32, end: u32, mode: SchedulingMode) -> Task {
        s.create_task(NewTask::new(id, id.to_uppercase(), day(start), day(end)).with_mode(mode))
            .unwrap()
    }

    fn fs(id: &str, pred: &str, succ: &str, lag: i32) -> Dependency {
        Dependency::new(id, pred, succ, DependencyType::FinishToStart, lag)
    }

    fn dates(s: &Schedule, id: &str) -> (NaiveDate, NaiveDate) {
        let t = s.task(id).unwrap();
        (t.start_date, t.end_date)
    }

    #[test]
    fn test_create_assigns_codes_in_order() {
        let mut s = schedule();
        add(&mut s, "a", 1, 2, SchedulingMode::Manual);
        add(&mut s, "b", 1, 2, SchedulingMode::Manual);
        let child = s
            .create_task(NewTask::new("a1", "A1", day(1), day(1)).with_parent("a"))
            .unwrap();
        assert_eq!(child.wbs_code, "1.1");
        assert_eq!(child.level, 1);

        // Inserting at position 0 shifts existing roots
        let first = s
            .create_task(NewTask::new("z", "Z", day(1), day(1)).with_order_index(0))
            .unwrap();
        assert_eq!(first.wbs_code, "1");
        assert_eq!(s.task("a").unwrap().wbs_code, "2");
        assert_eq!(s.task("a1").unwrap().wbs_code, "2.1");
        assert_eq!(s.task("b").unwrap().order_index, 2);
    }

    #[test]
    fn test_create_rejects_bad_dates() {
        let mut s = schedule();
        let err = s
            .create_task(NewTask::new("a", "A", day(5), day(4)))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDateRange { .. }));

        let err = s
            .create_task(NewTask::new("m", "M", day(5), day(6)).milestone())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDateRange { .. }));
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_create_rejects_unknown_parent_and_duplicates() {
        let mut s = schedule();
        assert_eq!(
            s.create_task(NewTask::new("a", "A", day(1), day(1)).with_parent("nope")),
            Err(ScheduleError::Store(StoreError::UnknownTask("nope".to_string())))
        );
        add(&mut s, "a", 1, 1, SchedulingMode::Manual);
        assert_eq!(
            s.create_task(NewTask::new("a", "A", day(1), day(1))),
            Err(ScheduleError::Store(StoreError::DuplicateTask("a".to_string())))
        );
    }

    #[test]
    fn test_add_dependency_propagates() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 10, 12, SchedulingMode::Auto);
        let moved = s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        assert_eq!(moved, vec!["b"]);
        assert_eq!(dates(&s, "b"), (day(4), day(6)));
    }

    #[test]
    fn test_rejected_dependency_leaves_state() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 4, 6, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        let before = s.snapshot();

        assert!(matches!(
            s.add_dependency(fs("e2", "b", "a", 0)),
            Err(ScheduleError::Graph(GraphError::CyclicDependency { .. }))
        ));
        assert!(matches!(
            s.add_dependency(fs("e3", "a", "a", 0)),
            Err(ScheduleError::Graph(GraphError::SelfDependency(_)))
        ));
        assert!(matches!(
            s.add_dependency(fs("e4", "a", "b", 5)),
            Err(ScheduleError::Graph(GraphError::DuplicateDependency { .. }))
        ));
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_update_dates_propagates_downstream() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 4, 6, SchedulingMode::Auto);
        add(&mut s, "c", 7, 7, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        s.add_dependency(fs("e2", "b", "c", 0)).unwrap();

        let moved = s
            .update_task("a", TaskUpdate::dates(day(5), day(7)))
            .unwrap();
        assert_eq!(moved, vec!["b", "c"]);
        assert_eq!(dates(&s, "b"), (day(8), day(10)));
        assert_eq!(dates(&s, "c"), (day(11), day(11)));
    }

    #[test]
    fn test_switch_to_auto_recomputes_task() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 20, 21, SchedulingMode::Manual);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        assert_eq!(dates(&s, "b"), (day(20), day(21)));

        let to_auto = TaskUpdate::mode(SchedulingMode::Auto);
        s.update_task("b", to_auto).unwrap();
        assert_eq!(dates(&s, "b"), (day(4), day(5)));
    }

    #[test]
    fn test_update_does_not_touch_status_or_progress_on_propagation() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 4, 6, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        s.update_task(
            "b",
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                progress: Some(40),
                ..Default::default()
            },
        )
        .unwrap();
        let shift = TaskUpdate::dates(day(2), day(4));
        s.update_task("a", shift).unwrap();
        let b = s.task("b").unwrap();
        assert_eq!(b.status, TaskStatus::InProgress);
        assert_eq!(b.progress, 40);
        assert_eq!(b.scheduling_mode, SchedulingMode::Auto);
        assert_eq!(b.start_date, day(5));
    }

    #[test]
    fn test_update_rejects_invalid_progress_and_milestone() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        let err = s
            .update_task(
                "a",
                TaskUpdate {
                    progress: Some(101),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidProgress { .. }));

        let err = s
            .update_task(
                "a",
                TaskUpdate {
                    is_milestone: Some(true),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDateRange { .. }));
        assert!(!s.task("a").unwrap().is_milestone);
        assert_eq!(s.task("a").unwrap().progress, 0);
    }

    #[test]
    fn test_reparent_under_own_child_rejected() {
        let mut s = schedule();
        add(&mut s, "x", 1, 1, SchedulingMode::Manual);
        s.create_task(NewTask::new("y", "Y", day(1), day(1)).with_parent("x"))
            .unwrap();
        let before = s.snapshot();

        let err = s
            .update_task(
                "x",
                TaskUpdate {
                    title: Some("renamed".to_string()),
                    parent_task_id: Some(Some("y".to_string())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::Hierarchy(HierarchyError::CircularHierarchy { .. })
        ));
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_reparent_refreshes_codes() {
        let mut s = schedule();
        add(&mut s, "x", 1, 1, SchedulingMode::Manual);
        add(&mut s, "y", 1, 1, SchedulingMode::Manual);
        add(&mut s, "z", 1, 1, SchedulingMode::Manual);
        let under_x = TaskUpdate::parent(Some("x".to_string()));
        s.update_task("z", under_x).unwrap();
        assert_eq!(s.task("z").unwrap().wbs_code, "1.1");
        assert_eq!(s.task("y").unwrap().wbs_code, "2");

        // Reorder only
        s.update_task(
            "y",
            TaskUpdate {
                order_index: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(s.task("y").unwrap().wbs_code, "1");
        assert_eq!(s.task("x").unwrap().wbs_code, "2");
        assert_eq!(s.task("z").unwrap().wbs_code, "2.1");
    }

    #[test]
    fn test_delete_task_detaches_edges_and_children() {
        let mut s = schedule();
        add(&mut s, "p", 1, 1, SchedulingMode::Manual);
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        s.create_task(NewTask::new("c1", "C1", day(1), day(1)).with_parent("a"))
            .unwrap();
        s.create_task(NewTask::new("c2", "C2", day(1), day(1)).with_parent("a"))
            .unwrap();
        add(&mut s, "b", 4, 6, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();

        let outcome = s
            .delete_task("a", ChildPolicy::Reparent("p".to_string()))
            .unwrap();
        assert_eq!(outcome.removed.map(|t| t.id), Some("a".to_string()));
        assert_eq!(outcome.removed_dependencies.len(), 1);
        assert!(s.graph().is_empty());
        assert_eq!(s.task("c1").unwrap().parent_task_id.as_deref(), Some("p"));
        assert_eq!(s.task("c1").unwrap().wbs_code, "1.1");
        assert_eq!(s.task("c2").unwrap().wbs_code, "1.2");
        assert_eq!(s.task("b").unwrap().wbs_code, "2");
        // Dates pushed by the removed edge stay
        assert_eq!(dates(&s, "b"), (day(4), day(6)));
    }

    #[test]
    fn test_delete_task_promotes_children() {
        let mut s = schedule();
        add(&mut s, "a", 1, 1, SchedulingMode::Manual);
        s.create_task(NewTask::new("c1", "C1", day(1), day(1)).with_parent("a"))
            .unwrap();
        s.delete_task("a", ChildPolicy::Promote).unwrap();
        let c1 = s.task("c1").unwrap();
        assert!(c1.is_root());
        assert_eq!(c1.wbs_code, "1");
        assert_eq!(c1.level, 0);
    }

    #[test]
    fn test_delete_task_rejects_reparent_into_subtree() {
        let mut s = schedule();
        add(&mut s, "a", 1, 1, SchedulingMode::Manual);
        s.create_task(NewTask::new("c1", "C1", day(1), day(1)).with_parent("a"))
            .unwrap();
        s.create_task(NewTask::new("g", "G", day(1), day(1)).with_parent("c1"))
            .unwrap();
        let before = s.snapshot();
        assert!(s
            .delete_task("a", ChildPolicy::Reparent("g".to_string()))
            .is_err());
        assert!(s
            .delete_task("a", ChildPolicy::Reparent("a".to_string()))
            .is_err());
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_delete_dependency_full_pass() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 1, 9, SchedulingMode::Manual);
        add(&mut s, "c", 1, 1, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "c", 0)).unwrap();
        s.add_dependency(fs("e2", "b", "c", 0)).unwrap();
        assert_eq!(dates(&s, "c"), (day(10), day(10)));

        let (removed, moved) = s.delete_dependency("e2").unwrap();
        assert_eq!(removed.predecessor_task_id, "b");
        assert_eq!(moved, vec!["c"]);
        assert_eq!(dates(&s, "c"), (day(4), day(4)));

        assert!(matches!(
            s.delete_dependency("e2"),
            Err(ScheduleError::Graph(GraphError::UnknownDependency(_)))
        ));
    }

    #[test]
    fn test_scoped_removal_recompute() {
        let config = EngineConfig::default().with_removal_recompute(RemovalRecompute::Scoped);
        let mut s = Schedule::new("sched", config);
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 1, 9, SchedulingMode::Manual);
        add(&mut s, "c", 1, 1, SchedulingMode::Auto);
        add(&mut s, "d", 1, 1, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "c", 0)).unwrap();
        s.add_dependency(fs("e2", "b", "c", 0)).unwrap();
        s.add_dependency(fs("e3", "c", "d", 0)).unwrap();

        let (_, moved) = s.delete_dependency("e2").unwrap();
        assert_eq!(moved, vec!["c", "d"]);
        assert_eq!(dates(&s, "d"), (day(5), day(5)));
    }

    #[test]
    fn test_auto_schedule_all_twice_is_stable() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 1, 2, SchedulingMode::Auto);
        add(&mut s, "c", 1, 4, SchedulingMode::Auto);
        let sf = Dependency::new("e2", "b", "c", DependencyType::StartToFinish, 2);
        s.graph.add_edge(fs("e1", "a", "b", 1), &s.store).unwrap();
        s.graph.add_edge(sf, &s.store).unwrap();

        let first = s.auto_schedule_all().unwrap();
        assert_eq!(first, vec!["b", "c"]);
        let after_first = s.snapshot();
        assert!(s.auto_schedule_all().unwrap().is_empty());
        assert_eq!(s.snapshot(), after_first);
    }

    #[test]
    fn test_calculate_critical_path_stores_fields() {
        let mut s = schedule();
        add(&mut s, "a", 1, 2, SchedulingMode::Manual);
        add(&mut s, "b", 1, 2, SchedulingMode::Auto);
        add(&mut s, "c", 1, 2, SchedulingMode::Auto);
        s.add_dependency(fs("e1", "a", "b", 0)).unwrap();
        s.add_dependency(fs("e2", "b", "c", 0)).unwrap();

        let result = s.calculate_critical_path().unwrap();
        assert_eq!(result.critical_path_tasks, vec!["a", "b", "c"]);
        let c = s.task("c").unwrap();
        assert_eq!(c.cpm.early_start, Some(day(5)));
        assert_eq!(c.cpm.early_finish, Some(day(7)));
        assert_eq!(c.cpm.total_float, Some(0));
        assert_eq!(c.cpm.is_critical_path, Some(true));
    }

    #[test]
    fn test_snapshot_with_cycle_is_integrity_error() {
        let mut s = schedule();
        add(&mut s, "a", 1, 1, SchedulingMode::Manual);
        add(&mut s, "b", 1, 1, SchedulingMode::Manual);
        let mut snapshot = s.snapshot();
        snapshot.dependencies = vec![fs("e1", "a", "b", 0), fs("e2", "b", "a", 0)];
        assert!(matches!(
            Schedule::from_snapshot(snapshot, EngineConfig::default()),
            Err(ScheduleError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_snapshot_with_malformed_task_is_integrity_error() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 1, 1, SchedulingMode::Manual);
        let valid = s.snapshot();

        let mut reversed = valid.clone();
        reversed.tasks[1].start_date = day(9);
        reversed.tasks[1].end_date = day(5);

        let mut stretched_milestone = valid.clone();
        stretched_milestone.tasks[1].is_milestone = true;
        stretched_milestone.tasks[1].end_date = day(7);

        let mut overdone = valid.clone();
        overdone.tasks[0].progress = 150;

        for snapshot in [reversed, stretched_milestone, overdone] {
            assert!(matches!(
                Schedule::from_snapshot(snapshot, EngineConfig::default()),
                Err(ScheduleError::DataIntegrity(_))
            ));
        }
        assert!(Schedule::from_snapshot(valid, EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_lag_past_calendar_end_is_rejected() {
        let mut s = schedule();
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 10, 12, SchedulingMode::Auto);
        let before = s.snapshot();

        let err = s.add_dependency(fs("e1", "a", "b", 200_000_000)).unwrap_err();
        assert!(matches!(err, ScheduleError::DateOutOfRange(_)));
        assert_eq!(s.snapshot(), before);

        // The schedule stays usable
        assert_eq!(s.add_dependency(fs("e1", "a", "b", 0)).unwrap(), vec!["b"]);
    }

    #[test]
    fn test_critical_path_at_calendar_end_is_rejected() {
        let mut s = schedule();
        s.create_task(NewTask::new("a", "A", NaiveDate::MAX, NaiveDate::MAX))
            .unwrap();
        let before = s.snapshot();

        let err = s.calculate_critical_path().unwrap_err();
        assert!(matches!(err, ScheduleError::DateOutOfRange(_)));
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_exhausted_budget_commits_nothing() {
        let config = EngineConfig::default().with_time_budget(std::time::Duration::ZERO);
        let mut s = Schedule::new("sched", EngineConfig::default());
        add(&mut s, "a", 1, 3, SchedulingMode::Manual);
        add(&mut s, "b", 10, 12, SchedulingMode::Auto);
        let mut s = Schedule::from_snapshot(s.snapshot(), config).unwrap();
        let before = s.snapshot();

        let err = s.add_dependency(fs("e1", "a", "b", 0)).unwrap_err();
        assert!(matches!(err, ScheduleError::Budget(_)));
        assert_eq!(s.snapshot(), before);
    }
}
