//! Registry of dependencies, their scheduled checks and cached status.

use crate::dependency::Dependency;
use crate::graph::{Edge, EdgeSet, ROOT, walk_breadth_first};
use crate::metrics::MetricsRegistry;
use crate::resolve::is_healthy;
use crate::status::{DependencyStatus, StatusCache};
use common::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Tracks registered dependencies, runs their checks and serves the cached
/// results.
///
/// Clones share state. Each newly registered dependency gets one spawned
/// task that checks it immediately and then on its interval; the task lives
/// until [`Manager::shutdown`].
#[derive(Clone, Default)]
pub struct Manager {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Registered dependencies by name
    dependencies: DashMap<String, Dependency>,

    edges: EdgeSet,

    /// Check task per dependency name
    schedules: DashMap<String, JoinHandle<()>>,

    status: StatusCache,

    metrics: Option<Arc<MetricsRegistry>>,

    /// Registration generation, bumped by every shutdown. Held for writing
    /// by `register` and `shutdown`, for reading by check tasks while they
    /// publish a result.
    epoch: Arc<RwLock<u64>>,
}

impl Manager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty manager that records check metrics
    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                metrics: Some(metrics),
                ..Inner::default()
            }),
        }
    }

    /// Register dependencies, and transitively their children, under
    /// `parent` (or [`ROOT`] when `None`).
    ///
    /// Children are registered breadth-first so every parent records its
    /// edges before any grandchild is visited. Registering a dependency that
    /// is already registered only adds the new edge. Registering a different
    /// dependency under a taken name fails with [`Error::NameConflict`]
    /// before anything is recorded.
    ///
    /// Registrations and [`Manager::shutdown`] are serialised: each call
    /// lands entirely before or entirely after any other.
    ///
    /// Must be called within a tokio runtime.
    pub fn register<I>(&self, parent: Option<&str>, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = Dependency>,
    {
        let parent = parent.unwrap_or(ROOT);
        let dependencies: Vec<Dependency> = dependencies.into_iter().collect();

        let epoch = self.inner.epoch.write().unwrap_or_else(PoisonError::into_inner);
        self.check_conflicts(&dependencies)?;

        let mut added = 0usize;
        walk_breadth_first(parent, dependencies, |parent, dependency| {
            let visit = match self.inner.dependencies.entry(dependency.name().to_string()) {
                Entry::Occupied(existing) if existing.get().ptr_eq(dependency) => false,
                Entry::Occupied(_) => {
                    return Err(Error::NameConflict(dependency.name().to_string()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(dependency.clone());
                    self.schedule(dependency, *epoch);
                    added += 1;
                    true
                }
            };

            if self.inner.edges.insert(Edge::new(parent, dependency.name())) {
                debug!(source = parent, target = dependency.name(), "Recorded edge");
            }
            Ok(visit)
        })?;

        if let Some(ref m) = self.inner.metrics {
            m.record_registration(self.size(), self.inner.edges.len());
        }
        info!(
            parent,
            added,
            total = self.size(),
            edges = self.inner.edges.len(),
            "Registered dependencies"
        );
        Ok(())
    }

    /// Reject names that are registered, or reachable, as a different dependency.
    fn check_conflicts(&self, dependencies: &[Dependency]) -> Result<()> {
        let mut seen: HashMap<String, Dependency> = HashMap::new();
        walk_breadth_first(ROOT, dependencies.to_vec(), |_, dependency| {
            if let Some(existing) = self.inner.dependencies.get(dependency.name()) {
                if !existing.ptr_eq(dependency) {
                    return Err(Error::NameConflict(dependency.name().to_string()));
                }
            }
            match seen.get(dependency.name()) {
                Some(other) if other.ptr_eq(dependency) => Ok(false),
                Some(_) => Err(Error::NameConflict(dependency.name().to_string())),
                None => {
                    seen.insert(dependency.name().to_string(), dependency.clone());
                    Ok(true)
                }
            }
        })
    }

    /// Spawn the check task for a newly registered dependency
    fn schedule(&self, dependency: &Dependency, generation: u64) {
        let handle = tokio::spawn(run_checks(
            dependency.clone(),
            Publisher {
                status: self.inner.status.clone(),
                metrics: self.inner.metrics.clone(),
                epoch: self.inner.epoch.clone(),
                generation,
            },
        ));

        if let Some(previous) = self.inner.schedules.insert(dependency.name().to_string(), handle) {
            previous.abort();
        }
        debug!(
            dependency = dependency.name(),
            interval_ms = dependency.interval().as_millis(),
            "Scheduled dependency check"
        );
    }

    /// Number of distinct registered dependencies
    pub fn size(&self) -> usize {
        self.inner.dependencies.len()
    }

    /// Number of check tasks held by the manager
    pub fn scheduled_checks(&self) -> usize {
        self.inner.schedules.len()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.dependencies.contains_key(name)
    }

    /// Last known health of one dependency, `None` until its first check completes
    pub fn status(&self, name: &str) -> Option<bool> {
        self.inner.status.get(name)
    }

    /// Stop every check task, then forget all dependencies, edges and status.
    ///
    /// State is cleared in one step with respect to [`Manager::register`].
    /// Every stopped task has finished when this returns, and none of them
    /// publishes a result once the state is cleared. Dependencies registered
    /// while the tasks are being joined belong to the next generation and
    /// are left running. Safe to call on an empty manager.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut epoch = self.inner.epoch.write().unwrap_or_else(PoisonError::into_inner);
            *epoch += 1;

            let names: Vec<String> = self
                .inner
                .schedules
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            let handles: Vec<JoinHandle<()>> = names
                .iter()
                .filter_map(|name| self.inner.schedules.remove(name).map(|(_, handle)| handle))
                .collect();
            for handle in &handles {
                handle.abort();
            }

            self.inner.status.clear();
            self.inner.dependencies.clear();
            self.inner.edges.clear();
            if let Some(ref m) = self.inner.metrics {
                m.reset_dependencies();
            }
            handles
        };

        let stopped = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!(error = %e, "Dependency check task panicked");
                }
            }
        }
        info!(stopped, "Manager shut down");
    }

    /// Snapshot of cached health, in the order dependencies were first checked
    pub fn dependency_status_list(&self) -> Vec<DependencyStatus> {
        self.inner.status.snapshot()
    }

    /// Snapshot of all recorded edges
    pub fn adjacency_list(&self) -> Vec<Edge> {
        self.inner.edges.to_vec()
    }

    /// Live handle to the status cache
    pub fn status_cache(&self) -> StatusCache {
        self.inner.status.clone()
    }

    /// Layer that exposes the live status cache to request handlers as an
    /// `Extension<StatusCache>`.
    pub fn middleware(&self) -> axum::Extension<StatusCache> {
        axum::Extension(self.status_cache())
    }

    /// Whether both handles share the same state
    pub fn ptr_eq(&self, other: &Manager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Where a check task writes its results
struct Publisher {
    status: StatusCache,
    metrics: Option<Arc<MetricsRegistry>>,
    epoch: Arc<RwLock<u64>>,
    /// Generation the task was scheduled in
    generation: u64,
}

/// Check once, then keep checking on the dependency's interval.
async fn run_checks(dependency: Dependency, publisher: Publisher) {
    check(&dependency, &publisher).await;

    if dependency.interval().is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval(dependency.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // First tick completes immediately

    loop {
        ticker.tick().await;
        check(&dependency, &publisher).await;
    }
}

async fn check(dependency: &Dependency, publisher: &Publisher) {
    let start = Instant::now();
    let healthy = is_healthy(dependency).await;
    let elapsed = start.elapsed();

    let previous = {
        let epoch = publisher.epoch.read().unwrap_or_else(PoisonError::into_inner);
        if *epoch != publisher.generation {
            debug!(dependency = dependency.name(), "Dropped check result after shutdown");
            return;
        }
        if let Some(ref m) = publisher.metrics {
            m.record_check(dependency.name(), healthy, elapsed);
        }
        publisher.status.set(dependency.name(), healthy)
    };

    match previous {
        Some(previous) if previous != healthy => {
            info!(dependency = dependency.name(), healthy, "Dependency health changed");
        }
        Some(_) => {
            debug!(
                dependency = dependency.name(),
                healthy,
                duration_ms = elapsed.as_millis(),
                "Dependency check completed"
            );
        }
        None => {
            info!(dependency = dependency.name(), healthy, "Initial dependency status");
        }
    }
}

/// Lazily created manager with an explicit reset.
///
/// `get` returns the same manager until `shutdown`, after which the next
/// `get` creates a fresh, empty one. The slot is owned by the application
/// and shared like any other value.
#[derive(Default)]
pub struct ManagerSlot {
    current: Mutex<Option<Manager>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ManagerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Managers created by this slot record into `metrics`
    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            current: Mutex::new(None),
            metrics: Some(metrics),
        }
    }

    /// Current manager, created if none exists
    pub fn get(&self) -> Manager {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .get_or_insert_with(|| match &self.metrics {
                Some(metrics) => Manager::with_metrics(metrics.clone()),
                None => Manager::new(),
            })
            .clone()
    }

    /// Shut down the current manager, if any, and empty the slot
    pub async fn shutdown(&self) {
        let manager = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(manager) = manager {
            manager.shutdown().await;
        }
    }
}
