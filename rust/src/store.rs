//! In-memory task arena for one schedule.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::models::Task;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),
    #[error("Task {task} belongs to schedule {found}, expected {expected}")]
    ForeignTask {
        task: String,
        found: String,
        expected: String,
    },
}

/// All tasks of one schedule keyed by ID.
///
/// Relationships are stored as IDs on the records, never as references, so
/// navigation here is a lookup and the arena can't hold dangling links.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    schedule_id: String,
    tasks: FxHashMap<String, Task>,
}

impl TaskStore {
    pub fn new(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            tasks: FxHashMap::default(),
        }
    }

    /// Build a store from loaded records.
    pub fn from_tasks(
        schedule_id: impl Into<String>,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(schedule_id);
        for task in tasks {
            store.insert(task)?;
        }
        Ok(store)
    }

    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    pub fn insert(&mut self, task: Task) -> Result<(), StoreError> {
        if task.schedule_id != self.schedule_id {
            return Err(StoreError::ForeignTask {
                task: task.id,
                found: task.schedule_id,
                expected: self.schedule_id.clone(),
            });
        }
        if self.tasks.contains_key(&task.id) {
            return Err(StoreError::DuplicateTask(task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        self.tasks.remove(id)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Like `get`, but a missing ID is an error.
    pub fn require(&self, id: &str) -> Result<&Task, StoreError> {
        self.tasks
            .get(id)
            .ok_or_else(|| StoreError::UnknownTask(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &str) -> Result<&mut Task, StoreError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownTask(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Children of `parent` (roots for `None`), in sibling order.
    pub fn children(&self, parent: Option<&str>) -> Vec<&Task> {
        let mut children: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_task_id.as_deref() == parent)
            .collect();
        children.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        children
    }

    /// Other tasks sharing `id`'s parent, in sibling order.
    pub fn siblings(&self, id: &str) -> Result<Vec<&Task>, StoreError> {
        let task = self.require(id)?;
        Ok(self
            .children(task.parent_task_id.as_deref())
            .into_iter()
            .filter(|t| t.id != id)
            .collect())
    }

    /// Every task, unordered.
    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    /// Consume the store, returning tasks sorted by ID.
    pub fn into_tasks(self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.into_values().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }
}
