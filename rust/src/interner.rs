//! Dense positions for the tasks taking part in one graph pass.
//!
//! A pass ranks its tasks once, then works over `Vec`s indexed by
//! `TaskIdx`. Because positions follow the ranking, comparing two indices
//! compares the tasks' rank.

use rustc_hash::FxHashMap;

use crate::models::Dependency;

/// Position of a task within a ranked pass.
pub type TaskIdx = u32;

/// Ranked task IDs borrowed from the pass that built them.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex<'a> {
    positions: FxHashMap<&'a str, TaskIdx>,
    ids: Vec<&'a str>,
}

impl<'a> TaskIndex<'a> {
    /// Number `ids` in the given (already ranked) order. A repeated ID keeps
    /// its first position.
    pub fn ranked(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let ids = ids.into_iter();
        let mut index = Self {
            positions: FxHashMap::with_capacity_and_hasher(ids.size_hint().0, Default::default()),
            ids: Vec::with_capacity(ids.size_hint().0),
        };
        for id in ids {
            if !index.positions.contains_key(id) {
                index.positions.insert(id, index.ids.len() as TaskIdx);
                index.ids.push(id);
            }
        }
        index
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<TaskIdx> {
        self.positions.get(id).copied()
    }

    #[inline]
    pub fn id(&self, idx: TaskIdx) -> Option<&'a str> {
        self.ids.get(idx as usize).copied()
    }

    /// Positions of an edge's predecessor and successor, when both take
    /// part in the pass.
    pub fn edge(&self, edge: &Dependency) -> Option<(TaskIdx, TaskIdx)> {
        Some((
            self.get(&edge.predecessor_task_id)?,
            self.get(&edge.successor_task_id)?,
        ))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DependencyType;

    #[test]
    fn test_ranked_positions() {
        let index = TaskIndex::ranked(["design", "build", "design", "ship"]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("design"), Some(0));
        assert_eq!(index.get("ship"), Some(2));
        assert_eq!(index.get("test"), None);
        assert_eq!(index.id(1), Some("build"));
        assert_eq!(index.id(3), None);
    }

    #[test]
    fn test_edge_needs_both_ends() {
        let index = TaskIndex::ranked(["a", "b"]);
        let inside = Dependency::new("e1", "b", "a", DependencyType::FinishToStart, 0);
        let outside = Dependency::new("e2", "a", "z", DependencyType::FinishToStart, 0);
        assert_eq!(index.edge(&inside), Some((1, 0)));
        assert_eq!(index.edge(&outside), None);
        assert!(TaskIndex::ranked(std::iter::empty()).is_empty());
    }
}
