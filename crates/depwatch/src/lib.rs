//! Dependency graph health monitoring.
//!
//! Declare the dependencies a service relies on, how each one is checked
//! and which other dependencies it needs in turn. A dependency is healthy
//! only when it and everything it transitively depends on are healthy.
//!
//! # Features
//!
//! - Cyclic graphs terminate; each dependency is resolved once per evaluation
//! - Background checks per dependency on its own interval
//! - Cached status and edge list for status pages
//! - TCP, HTTP and Datadog monitor resolvers, or any async closure
//! - Prometheus metrics for checks and graph size
//!
//! # Example
//!
//! ```no_run
//! use depwatch::{DependencyConfig, DependencyGraph, Manager};
//! use depwatch::resolvers::{TcpResolver, resolver_fn};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = DependencyGraph::build([
//!     DependencyConfig::new("api", resolver_fn(|| async { true }))
//!         .interval(Duration::from_secs(10))
//!         .depends_on(["postgres"]),
//!     DependencyConfig::new(
//!         "postgres",
//!         TcpResolver::new("10.0.0.5:5432".parse()?, Duration::from_secs(2)),
//!     )
//!     .interval(Duration::from_secs(5)),
//! ])?;
//!
//! let manager = Manager::new();
//! manager.register(None, graph.get("api"))?;
//!
//! // Cached results become available once the first checks complete
//! for status in manager.dependency_status_list() {
//!     println!("{}: {}", status.name, status.healthy);
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod dependency;
pub mod graph;
pub mod manager;
pub mod metrics;
pub mod resolve;
pub mod resolvers;
pub mod status;

pub use common::{Error, Result};
pub use dependency::{Dependency, DependencyConfig, DependencyGraph};
pub use graph::{Edge, EdgeSet, ROOT, build_edges};
pub use manager::{Manager, ManagerSlot};
pub use metrics::MetricsRegistry;
pub use resolve::{Memo, is_healthy, is_healthy_with};
pub use resolvers::{FnResolver, Resolver, StaticResolver, resolver_fn};
pub use status::{DependencyStatus, StatusCache};
