//! Persistence boundary: loading a schedule and writing back its changes.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{Dependency, Task};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Schedule not found: {0}")]
    NotFound(String),
    #[error("Storage failure: {0}")]
    Backend(String),
}

/// Everything the engine needs about one schedule, loaded in one piece.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_id: String,
    /// Display bounds only; task placement is not constrained by them.
    #[serde(default)]
    pub schedule_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub schedule_end_date: Option<NaiveDate>,
    pub tasks: Vec<Task>,
    pub dependencies: Vec<Dependency>,
}

impl ScheduleSnapshot {
    pub fn new(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            ..Default::default()
        }
    }
}

/// Records to write back after one operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New or modified tasks, sorted by ID.
    pub upserted_tasks: Vec<Task>,
    pub deleted_task_ids: Vec<String>,
    pub added_dependencies: Vec<Dependency>,
    pub removed_dependency_ids: Vec<String>,
}

impl ChangeSet {
    /// Difference between two states of the same schedule.
    pub fn between(before: &ScheduleSnapshot, after: &ScheduleSnapshot) -> Self {
        let old_tasks: FxHashMap<&str, &Task> =
            before.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let new_tasks: FxHashMap<&str, &Task> =
            after.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut upserted_tasks: Vec<Task> = after
            .tasks
            .iter()
            .filter(|t| old_tasks.get(t.id.as_str()) != Some(t))
            .cloned()
            .collect();
        upserted_tasks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut deleted_task_ids: Vec<String> = before
            .tasks
            .iter()
            .filter(|t| !new_tasks.contains_key(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();
        deleted_task_ids.sort();

        let old_edges: FxHashMap<&str, &Dependency> = before
            .dependencies
            .iter()
            .map(|d| (d.id.as_str(), d))
            .collect();
        let new_edges: FxHashMap<&str, &Dependency> = after
            .dependencies
            .iter()
            .map(|d| (d.id.as_str(), d))
            .collect();

        let mut added_dependencies: Vec<Dependency> = after
            .dependencies
            .iter()
            .filter(|d| !old_edges.contains_key(d.id.as_str()))
            .cloned()
            .collect();
        added_dependencies.sort_by(|a, b| a.id.cmp(&b.id));

        let mut removed_dependency_ids: Vec<String> = before
            .dependencies
            .iter()
            .filter(|d| !new_edges.contains_key(d.id.as_str()))
            .map(|d| d.id.clone())
            .collect();
        removed_dependency_ids.sort();

        Self {
            upserted_tasks,
            deleted_task_ids,
            added_dependencies,
            removed_dependency_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserted_tasks.is_empty()
            && self.deleted_task_ids.is_empty()
            && self.added_dependencies.is_empty()
            && self.removed_dependency_ids.is_empty()
    }

    /// Apply to a stored snapshot.
    pub fn apply_to(&self, snapshot: &mut ScheduleSnapshot) {
        snapshot
            .tasks
            .retain(|t| !self.deleted_task_ids.contains(&t.id));
        for task in &self.upserted_tasks {
            match snapshot.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => snapshot.tasks.push(task.clone()),
            }
        }
        snapshot
            .dependencies
            .retain(|d| !self.removed_dependency_ids.contains(&d.id));
        snapshot
            .dependencies
            .extend(self.added_dependencies.iter().cloned());
    }
}

/// Storage collaborator owning task and dependency records.
///
/// `save` must apply the whole change set or nothing.
pub trait ScheduleRepository: Send + Sync {
    fn load(&self, schedule_id: &str) -> Result<ScheduleSnapshot, RepositoryError>;
    fn save(&self, schedule_id: &str, changes: &ChangeSet) -> Result<(), RepositoryError>;
}

/// Repository keeping snapshots in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    schedules: Mutex<FxHashMap<String, ScheduleSnapshot>>,
    saves: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: ScheduleSnapshot) -> Result<(), RepositoryError> {
        let mut schedules = self.lock()?;
        schedules.insert(snapshot.schedule_id.clone(), snapshot);
        Ok(())
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, FxHashMap<String, ScheduleSnapshot>>, RepositoryError>
    {
        self.schedules
            .lock()
            .map_err(|_| RepositoryError::Backend("repository lock poisoned".to_string()))
    }
}

impl ScheduleRepository for InMemoryRepository {
    fn load(&self, schedule_id: &str) -> Result<ScheduleSnapshot, RepositoryError> {
        self.lock()?
            .get(schedule_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(schedule_id.to_string()))
    }

    fn save(&self, schedule_id: &str, changes: &ChangeSet) -> Result<(), RepositoryError> {
        let mut schedules = self.lock()?;
        let snapshot = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| RepositoryError::NotFound(schedule_id.to_string()))?;
        changes.apply_to(snapshot);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
