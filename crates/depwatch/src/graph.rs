//! Dependency edges and the breadth-first graph walk.

use crate::dependency::Dependency;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source name used for dependencies registered at top level.
pub const ROOT: &str = "root";

/// Directed relationship: `target` is a dependency of `source`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Concurrent edge set that drops duplicate `(source, target)` pairs and
/// remembers insertion order.
#[derive(Debug, Default)]
pub struct EdgeSet {
    edges: DashMap<Edge, u64>,
    next_seq: AtomicU64,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge, returning `false` if the pair was already present.
    pub fn insert(&self, edge: Edge) -> bool {
        match self.edges.entry(edge) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.next_seq.fetch_add(1, Ordering::Relaxed));
                true
            }
        }
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.edges.contains_key(&Edge::new(source, target))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn clear(&self) {
        self.edges.clear();
    }

    /// Snapshot of all edges in insertion order.
    pub fn to_vec(&self) -> Vec<Edge> {
        let mut ordered: Vec<(u64, Edge)> = self
            .edges
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, edge)| edge).collect()
    }
}

/// Walk `dependencies` and their descendants breadth-first.
///
/// `visit` is called with the parent name and each dependency of every work
/// item; all direct children of a parent are visited before any grandchild.
/// When `visit` returns `true` the dependency's own children are queued
/// under its name, otherwise it is not expanded.
pub(crate) fn walk_breadth_first<E>(
    parent: &str,
    dependencies: Vec<Dependency>,
    mut visit: impl FnMut(&str, &Dependency) -> Result<bool, E>,
) -> Result<(), E> {
    let mut queue: VecDeque<(String, Vec<Dependency>)> = VecDeque::new();
    queue.push_back((parent.to_string(), dependencies));

    while let Some((parent, dependencies)) = queue.pop_front() {
        for dependency in dependencies {
            if visit(&parent, &dependency)? && dependency.has_dependencies() {
                queue.push_back((
                    dependency.name().to_string(),
                    dependency.dependencies().collect(),
                ));
            }
        }
    }

    Ok(())
}

/// Every edge reachable from `dependencies` registered under `parent`,
/// deduplicated, in breadth-first discovery order.
pub fn build_edges<'a, I>(parent: &str, dependencies: I) -> Vec<Edge>
where
    I: IntoIterator<Item = &'a Dependency>,
{
    let edges = EdgeSet::new();
    let mut expanded: HashSet<Dependency> = HashSet::new();

    let walked = walk_breadth_first::<Infallible>(
        parent,
        dependencies.into_iter().cloned().collect(),
        |parent, dependency| {
            edges.insert(Edge::new(parent, dependency.name()));
            Ok(expanded.insert(dependency.clone()))
        },
    );
    match walked {
        Ok(()) => edges.to_vec(),
        Err(never) => match never {},
    }
}
