//! Precedence edges between tasks and their validation.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

use crate::hierarchy::WbsCode;
use crate::interner::{TaskIdx, TaskIndex};
use crate::models::{Dependency, Task};
use crate::store::{StoreError, TaskStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task {0} cannot depend on itself")]
    SelfDependency(String),
    #[error("Dependency {predecessor} -> {successor} already exists")]
    DuplicateDependency {
        predecessor: String,
        successor: String,
    },
    #[error("Dependency {predecessor} -> {successor} would create a cycle")]
    CyclicDependency {
        predecessor: String,
        successor: String,
    },
    #[error("Duplicate dependency id: {0}")]
    DuplicateDependencyId(String),
    #[error("Unknown dependency: {0}")]
    UnknownDependency(String),
    #[error("Circular dependency detected among tasks {0:?}")]
    CycleDetected(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deterministic tie-break key: WBS code, then sibling index, then ID.
pub fn rank_key(task: &Task) -> (WbsCode, i32, &str) {
    (
        WbsCode::parse(&task.wbs_code),
        task.order_index,
        task.id.as_str(),
    )
}

/// Edge set of one schedule with adjacency lists of edge IDs per task.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: FxHashMap<String, Dependency>,
    outgoing: FxHashMap<String, Vec<String>>,
    incoming: FxHashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from loaded edges.
    ///
    /// Only structural checks run here; a cycle already present in stored
    /// data surfaces from [`DependencyGraph::validate`].
    pub fn from_edges(edges: impl IntoIterator<Item = Dependency>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for edge in edges {
            graph.check_structure(&edge)?;
            graph.link(edge);
        }
        Ok(graph)
    }

    /// Check the loaded graph against the store: endpoints exist and the
    /// whole edge set is acyclic.
    pub fn validate(&self, store: &TaskStore) -> Result<(), GraphError> {
        for edge in self.edges.values() {
            store.require(&edge.predecessor_task_id)?;
            store.require(&edge.successor_task_id)?;
        }
        self.topological_order(store, None).map(|_| ())
    }

    /// Insert an edge after validating it.
    ///
    /// Rejects self-edges, a second edge for the same ordered pair, and any
    /// edge whose successor already reaches its predecessor.
    pub fn add_edge(&mut self, edge: Dependency, store: &TaskStore) -> Result<(), GraphError> {
        store.require(&edge.predecessor_task_id)?;
        store.require(&edge.successor_task_id)?;
        self.check_structure(&edge)?;
        if self.reaches(&edge.successor_task_id, &edge.predecessor_task_id) {
            return Err(GraphError::CyclicDependency {
                predecessor: edge.predecessor_task_id,
                successor: edge.successor_task_id,
            });
        }
        self.link(edge);
        Ok(())
    }

    fn check_structure(&self, edge: &Dependency) -> Result<(), GraphError> {
        if edge.predecessor_task_id == edge.successor_task_id {
            return Err(GraphError::SelfDependency(edge.predecessor_task_id.clone()));
        }
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateDependencyId(edge.id.clone()));
        }
        if self
            .find(&edge.predecessor_task_id, &edge.successor_task_id)
            .is_some()
        {
            return Err(GraphError::DuplicateDependency {
                predecessor: edge.predecessor_task_id.clone(),
                successor: edge.successor_task_id.clone(),
            });
        }
        Ok(())
    }

    fn link(&mut self, edge: Dependency) {
        self.outgoing
            .entry(edge.predecessor_task_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.successor_task_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
    }

    /// Remove an edge. Dates already propagated along it are left as they are.
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<Dependency, GraphError> {
        let edge = self
            .edges
            .remove(edge_id)
            .ok_or_else(|| GraphError::UnknownDependency(edge_id.to_string()))?;
        if let Some(list) = self.outgoing.get_mut(&edge.predecessor_task_id) {
            list.retain(|id| id != edge_id);
        }
        if let Some(list) = self.incoming.get_mut(&edge.successor_task_id) {
            list.retain(|id| id != edge_id);
        }
        Ok(edge)
    }

    /// Remove every edge touching `task_id`, returning them sorted by ID.
    pub fn detach_task(&mut self, task_id: &str) -> Vec<Dependency> {
        let mut ids: Vec<String> = self
            .outgoing
            .remove(task_id)
            .unwrap_or_default()
            .into_iter()
            .chain(self.incoming.remove(task_id).unwrap_or_default())
            .collect();
        ids.sort();
        ids.dedup();
        ids.iter()
            .filter_map(|id| self.remove_edge(id).ok())
            .collect()
    }

    pub fn get(&self, edge_id: &str) -> Option<&Dependency> {
        self.edges.get(edge_id)
    }

    /// The edge for an ordered (predecessor, successor) pair, if any.
    pub fn find(&self, predecessor: &str, successor: &str) -> Option<&Dependency> {
        self.outgoing(predecessor)
            .find(|e| e.successor_task_id == successor)
    }

    pub fn incoming<'a>(&'a self, task_id: &str) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.edge_list(&self.incoming, task_id)
    }

    pub fn outgoing<'a>(&'a self, task_id: &str) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.edge_list(&self.outgoing, task_id)
    }

    fn edge_list<'a>(
        &'a self,
        lists: &'a FxHashMap<String, Vec<String>>,
        task_id: &str,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        lists
            .get(task_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    /// Every edge, sorted by ID.
    pub fn edges(&self) -> Vec<&Dependency> {
        let mut edges: Vec<&Dependency> = self.edges.values().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether `to` can be reached from `from` along existing edges.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for edge in self.outgoing(current) {
                stack.push(edge.successor_task_id.as_str());
            }
        }
        false
    }

    /// `start` plus every task reachable from it.
    pub fn successor_closure(&self, start: &str) -> FxHashSet<String> {
        let mut closure: FxHashSet<String> = FxHashSet::default();
        let mut stack: Vec<&str> = vec![start];
        while let Some(current) = stack.pop() {
            if !closure.insert(current.to_string()) {
                continue;
            }
            for edge in self.outgoing(current) {
                stack.push(edge.successor_task_id.as_str());
            }
        }
        closure
    }

    /// Order tasks so every predecessor precedes its successors (Kahn's
    /// algorithm). Only edges with both ends in `scope` count; `None` means
    /// the whole store. Ready tasks are taken in [`rank_key`] order.
    pub fn topological_order(
        &self,
        store: &TaskStore,
        scope: Option<&FxHashSet<String>>,
    ) -> Result<Vec<String>, GraphError> {
        let mut members: Vec<&Task> = match scope {
            Some(scope) => scope.iter().filter_map(|id| store.get(id)).collect(),
            None => store.all().collect(),
        };
        members.sort_by(|a, b| rank_key(a).cmp(&rank_key(b)));

        // Index order equals rank order, so the heap can compare indices.
        let index = TaskIndex::ranked(members.iter().map(|t| t.id.as_str()));
        let n = index.len();

        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<TaskIdx>> = vec![Vec::new(); n];
        for edge in self.edges.values() {
            if let Some((p, s)) = index.edge(edge) {
                successors[p as usize].push(s);
                in_degree[s as usize] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<TaskIdx>> = (0..n as TaskIdx)
            .filter(|&i| in_degree[i as usize] == 0)
            .map(Reverse)
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(n);
        while let Some(Reverse(current)) = ready.pop() {
            if let Some(id) = index.id(current) {
                order.push(id.to_string());
            }
            for &next in &successors[current as usize] {
                in_degree[next as usize] -= 1;
                if in_degree[next as usize] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            let mut stuck: Vec<String> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .filter_map(|i| index.id(i as TaskIdx).map(str::to_string))
                .collect();
            stuck.sort();
            return Err(GraphError::CycleDetected(stuck));
        }

        Ok(order)
    }
}
