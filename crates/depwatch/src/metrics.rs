//! Prometheus metrics for dependency checks.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for per-dependency metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DependencyLabels {
    /// Dependency name
    pub dependency: String,
}

/// Labels for check result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    /// Dependency name
    pub dependency: String,
    /// Result (healthy, unhealthy)
    pub result: String,
}

/// Metrics registry with all depwatch metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Completed checks by result
    checks_total: Family<CheckLabels, Counter>,
    /// Duration of a full aggregate check, children included
    check_duration_seconds: Family<DependencyLabels, Histogram>,
    /// Last result (1=healthy, 0=unhealthy)
    dependency_healthy: Family<DependencyLabels, Gauge>,

    /// Distinct registered dependencies
    dependencies_registered: Gauge,
    /// Recorded graph edges
    edges: Gauge,
    /// Calls to register
    registrations_total: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "depwatch_checks",
            "Dependency health checks completed",
            checks_total.clone(),
        );

        let check_duration_seconds =
            Family::<DependencyLabels, Histogram>::new_with_constructor(|| {
                // 1ms to ~16s
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "depwatch_check_duration_seconds",
            "Aggregate health check duration in seconds",
            check_duration_seconds.clone(),
        );

        let dependency_healthy = Family::<DependencyLabels, Gauge>::default();
        registry.register(
            "depwatch_dependency_healthy",
            "Last aggregate health (1=healthy, 0=unhealthy)",
            dependency_healthy.clone(),
        );

        let dependencies_registered = Gauge::default();
        registry.register(
            "depwatch_dependencies_registered",
            "Number of registered dependencies",
            dependencies_registered.clone(),
        );

        let edges = Gauge::default();
        registry.register(
            "depwatch_edges",
            "Number of edges in the dependency graph",
            edges.clone(),
        );

        let registrations_total = Counter::default();
        registry.register(
            "depwatch_registrations",
            "Calls to register dependencies",
            registrations_total.clone(),
        );

        Self {
            registry,
            checks_total,
            check_duration_seconds,
            dependency_healthy,
            dependencies_registered,
            edges,
            registrations_total,
        }
    }

    /// Record a completed health check
    pub fn record_check(&self, dependency: &str, healthy: bool, duration: Duration) {
        self.checks_total
            .get_or_create(&CheckLabels {
                dependency: dependency.to_string(),
                result: result_label(healthy).to_string(),
            })
            .inc();

        let labels = DependencyLabels {
            dependency: dependency.to_string(),
        };
        self.check_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
        self.dependency_healthy
            .get_or_create(&labels)
            .set(i64::from(healthy));
    }

    /// Record a register call and the resulting graph size
    pub fn record_registration(&self, dependencies: usize, edges: usize) {
        self.registrations_total.inc();
        self.update_graph_size(dependencies, edges);
    }

    pub fn update_graph_size(&self, dependencies: usize, edges: usize) {
        self.dependencies_registered.set(dependencies as i64);
        self.edges.set(edges as i64);
    }

    /// Drop per-dependency series after shutdown
    pub fn reset_dependencies(&self) {
        self.dependency_healthy.clear();
        self.update_graph_size(0, 0);
    }

    /// Encode in the Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn result_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}
