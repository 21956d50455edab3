//! Repository-backed entry points.
//!
//! Each call locks its schedule, loads it, runs one operation and saves the
//! resulting change set. Operations on different schedules run in parallel;
//! operations on the same schedule are serialized.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::critical_path::CriticalPathResult;
use crate::log_changes;
use crate::models::{ChildPolicy, Dependency, NewTask, Task, TaskUpdate};
use crate::repository::{ChangeSet, RepositoryError, ScheduleRepository};
use crate::schedule::{DeleteOutcome, Schedule, ScheduleError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Lock poisoned for schedule {0}")]
    LockPoisoned(String),
}

pub struct ScheduleEngine<R: ScheduleRepository> {
    repository: R,
    config: EngineConfig,
    locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl<R: ScheduleRepository> ScheduleEngine<R> {
    pub fn new(repository: R, config: EngineConfig) -> Self {
        Self {
            repository,
            config,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn schedule_lock(&self, schedule_id: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| EngineError::LockPoisoned(schedule_id.to_string()))?;
        Ok(Arc::clone(
            locks
                .entry(schedule_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Drop the registry entry once no other call holds or waits on it.
    fn release_lock(&self, schedule_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(schedule_id)
                .is_some_and(|entry| Arc::strong_count(entry) == 1)
            {
                locks.remove(schedule_id);
            }
        }
    }

    /// Run `op` against a freshly loaded schedule and persist what changed.
    /// Nothing is saved when `op` fails.
    fn with_schedule<T>(
        &self,
        schedule_id: &str,
        op: impl FnOnce(&mut Schedule) -> Result<T, ScheduleError>,
    ) -> Result<T, EngineError> {
        let lock = self.schedule_lock(schedule_id)?;
        let result = self.run_locked(&lock, schedule_id, op);
        self.release_lock(schedule_id, lock);
        result
    }

    fn run_locked<T>(
        &self,
        lock: &Mutex<()>,
        schedule_id: &str,
        op: impl FnOnce(&mut Schedule) -> Result<T, ScheduleError>,
    ) -> Result<T, EngineError> {
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::LockPoisoned(schedule_id.to_string()))?;

        let before = self.repository.load(schedule_id)?;
        let mut schedule = Schedule::from_snapshot(before.clone(), self.config.clone())?;
        let value = op(&mut schedule)?;

        let changes = ChangeSet::between(&before, &schedule.snapshot());
        if !changes.is_empty() {
            log_changes!(
                self.config.verbosity,
                "Saving {}: {} tasks upserted, {} deleted, {} edges added, {} removed",
                schedule_id,
                changes.upserted_tasks.len(),
                changes.deleted_task_ids.len(),
                changes.added_dependencies.len(),
                changes.removed_dependency_ids.len()
            );
            self.repository.save(schedule_id, &changes)?;
        }
        Ok(value)
    }

    pub fn create_task(&self, schedule_id: &str, new: NewTask) -> Result<Task, EngineError> {
        self.with_schedule(schedule_id, |s| s.create_task(new))
    }

    pub fn update_task(
        &self,
        schedule_id: &str,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<Vec<String>, EngineError> {
        self.with_schedule(schedule_id, |s| s.update_task(task_id, update))
    }

    pub fn delete_task(
        &self,
        schedule_id: &str,
        task_id: &str,
        policy: ChildPolicy,
    ) -> Result<DeleteOutcome, EngineError> {
        self.with_schedule(schedule_id, |s| s.delete_task(task_id, policy))
    }

    pub fn add_dependency(
        &self,
        schedule_id: &str,
        dependency: Dependency,
    ) -> Result<Vec<String>, EngineError> {
        self.with_schedule(schedule_id, |s| s.add_dependency(dependency))
    }

    pub fn delete_dependency(
        &self,
        schedule_id: &str,
        dependency_id: &str,
    ) -> Result<(Dependency, Vec<String>), EngineError> {
        self.with_schedule(schedule_id, |s| s.delete_dependency(dependency_id))
    }

    pub fn auto_schedule_task(
        &self,
        schedule_id: &str,
        task_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        self.with_schedule(schedule_id, |s| s.auto_schedule_task(task_id))
    }

    pub fn auto_schedule_all(&self, schedule_id: &str) -> Result<Vec<String>, EngineError> {
        self.with_schedule(schedule_id, Schedule::auto_schedule_all)
    }

    pub fn calculate_critical_path(
        &self,
        schedule_id: &str,
    ) -> Result<CriticalPathResult, EngineError> {
        self.with_schedule(schedule_id, Schedule::calculate_critical_path)
    }
}
