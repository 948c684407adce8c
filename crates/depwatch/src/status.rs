//! Cached health status per dependency.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Last known health of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    healthy: bool,
}

/// Shared map from dependency name to its last computed health.
///
/// A name without an entry has not completed a check yet, which is distinct
/// from `Some(false)`. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    entries: Arc<DashMap<String, Slot>>,
    next_seq: Arc<AtomicU64>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known health, or `None` if no check has completed.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.entries.get(name).map(|slot| slot.healthy)
    }

    /// Record a result, returning the previous one.
    pub fn set(&self, name: &str, healthy: bool) -> Option<bool> {
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                Some(std::mem::replace(&mut occupied.get_mut().healthy, healthy))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    healthy,
                });
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// All entries, ordered by when each name was first recorded.
    pub fn snapshot(&self) -> Vec<DependencyStatus> {
        let mut ordered: Vec<(u64, DependencyStatus)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.seq,
                    DependencyStatus {
                        name: entry.key().clone(),
                        healthy: entry.healthy,
                    },
                )
            })
            .collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, status)| status).collect()
    }

    /// Entries as a name-sorted map, convenient for JSON objects.
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.healthy))
            .collect()
    }

    /// Count of `(healthy, unhealthy)` entries.
    pub fn counts(&self) -> (usize, usize) {
        self.entries.iter().fold((0, 0), |(up, down), entry| {
            if entry.healthy { (up + 1, down) } else { (up, down + 1) }
        })
    }
}
