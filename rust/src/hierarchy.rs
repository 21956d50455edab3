//! Parent/child tree maintenance: cycle checks, sibling order, WBS codes.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::store::{StoreError, TaskStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Moving {task} under {parent} would make it its own ancestor")]
    CircularHierarchy { task: String, parent: String },
    #[error("Parent chain of {0} does not terminate")]
    CorruptChain(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Dotted hierarchical position, compared segment by segment.
///
/// `"2.10"` sorts after `"2.9"`, and a parent sorts before its children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WbsCode(Vec<u32>);

impl WbsCode {
    /// Parse a code; non-numeric segments sort first as 0.
    pub fn parse(code: &str) -> Self {
        if code.is_empty() {
            return Self(Vec::new());
        }
        Self(code.split('.').map(|s| s.parse().unwrap_or(0)).collect())
    }

    pub fn child(&self, position: u32) -> Self {
        let mut segments = self.0.clone();
        segments.push(position);
        Self(segments)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl Ord for WbsCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for WbsCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for WbsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Check that `task_id` may be placed under `new_parent`.
///
/// Walks up from the candidate parent; meeting `task_id` means the candidate
/// is a descendant. The walk is bounded by the store size so a corrupted
/// chain is reported instead of looping.
pub fn check_parent(
    store: &TaskStore,
    task_id: &str,
    new_parent: Option<&str>,
) -> Result<(), HierarchyError> {
    store.require(task_id)?;
    let Some(parent_id) = new_parent else {
        return Ok(());
    };
    store.require(parent_id)?;

    let circular = || HierarchyError::CircularHierarchy {
        task: task_id.to_string(),
        parent: parent_id.to_string(),
    };

    let mut current = Some(parent_id);
    let mut steps = 0;
    while let Some(id) = current {
        if id == task_id {
            return Err(circular());
        }
        steps += 1;
        if steps > store.len() {
            return Err(HierarchyError::CorruptChain(parent_id.to_string()));
        }
        current = store.get(id).and_then(|t| t.parent_task_id.as_deref());
    }
    Ok(())
}

/// Verify every parent link resolves and every chain reaches a root.
pub fn validate_tree(store: &TaskStore) -> Result<(), HierarchyError> {
    for task in store.all() {
        let mut current = task.parent_task_id.as_deref();
        let mut steps = 0;
        while let Some(id) = current {
            let parent = store.require(id)?;
            steps += 1;
            if steps > store.len() || parent.id == task.id {
                return Err(HierarchyError::CorruptChain(task.id.clone()));
            }
            current = parent.parent_task_id.as_deref();
        }
    }
    Ok(())
}

/// Move `task_id` under `new_parent` at sibling `position` (None appends).
///
/// Both the old and the new sibling lists are renumbered. Codes are not
/// refreshed; callers follow up with [`recompute_codes`].
pub fn set_parent(
    store: &mut TaskStore,
    task_id: &str,
    new_parent: Option<&str>,
    position: Option<i32>,
) -> Result<(), HierarchyError> {
    check_parent(store, task_id, new_parent)?;

    let old_parent = store.require(task_id)?.parent_task_id.clone();
    store.require_mut(task_id)?.parent_task_id = new_parent.map(str::to_string);
    if old_parent.as_deref() != new_parent {
        renumber_children(store, old_parent.as_deref());
    }
    place_among_siblings(store, task_id, position)
}

/// Put `task_id` at `position` among its current siblings and renumber
/// them `0..n`. An occupied position pushes the holder back.
pub fn place_among_siblings(
    store: &mut TaskStore,
    task_id: &str,
    position: Option<i32>,
) -> Result<(), HierarchyError> {
    let mut order: Vec<String> = store
        .siblings(task_id)?
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    let slot = match position {
        Some(p) if p >= 0 => (p as usize).min(order.len()),
        Some(_) => 0,
        None => order.len(),
    };
    order.insert(slot, task_id.to_string());
    apply_order(store, &order);
    Ok(())
}

/// Renumber the children of `parent` to `0..n`, keeping their order.
pub fn renumber_children(store: &mut TaskStore, parent: Option<&str>) {
    let order: Vec<String> = store
        .children(parent)
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    apply_order(store, &order);
}

fn apply_order(store: &mut TaskStore, order: &[String]) {
    for (i, id) in order.iter().enumerate() {
        if let Some(task) = store.get_mut(id) {
            task.order_index = i as i32;
        }
    }
}

/// Assign WBS codes and levels depth-first below `scope`.
///
/// `None` recomputes the whole tree. `Some(parent)` recomputes the subtrees
/// of that parent's children, using the parent's current code as prefix.
pub fn recompute_codes(store: &mut TaskStore, scope: Option<&str>) -> Result<(), HierarchyError> {
    let mut children: FxHashMap<Option<&str>, Vec<(i32, &str)>> = FxHashMap::default();
    for task in store.all() {
        children
            .entry(task.parent_task_id.as_deref())
            .or_default()
            .push((task.order_index, task.id.as_str()));
    }
    for list in children.values_mut() {
        list.sort();
    }

    let (prefix, base_level) = match scope {
        Some(parent_id) => {
            let parent = store.require(parent_id)?;
            (WbsCode::parse(&parent.wbs_code), parent.level + 1)
        }
        None => (WbsCode::default(), 0),
    };

    let mut assignments: Vec<(String, String, u32)> = Vec::new();
    let mut stack: Vec<(Option<&str>, WbsCode, u32)> = vec![(scope, prefix, base_level)];
    while let Some((parent, code, level)) = stack.pop() {
        if assignments.len() > store.len() {
            return Err(HierarchyError::CorruptChain(
                parent.unwrap_or_default().to_string(),
            ));
        }
        let Some(kids) = children.get(&parent) else {
            continue;
        };
        for (i, &(_, id)) in kids.iter().enumerate() {
            let child_code = code.child(i as u32 + 1);
            assignments.push((id.to_string(), child_code.to_string(), level));
            stack.push((Some(id), child_code, level + 1));
        }
    }

    for (id, code, level) in assignments {
        if let Some(task) = store.get_mut(&id) {
            task.wbs_code = code;
            task.level = level;
        }
    }
    Ok(())
}
