//! Resolver trait and implementations.
//!
//! A resolver reports the health of a single dependency, ignoring its
//! children. Each implementation documents what it reports when it cannot
//! determine the dependency's state; the core never reinterprets a result.

mod datadog;
mod network;

pub use datadog::{DATADOG_API_URL, DatadogResolver, HttpMonitorSource, MonitorDetails, MonitorSource};
pub use network::{HttpResolver, TcpResolver};

use async_trait::async_trait;
use std::future::Future;

/// Asynchronously reports whether a dependency is healthy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns `true` when the dependency is healthy.
    async fn resolve(&self) -> bool;
}

/// Resolver backed by an async closure.
pub struct FnResolver<F> {
    f: F,
}

/// Wrap an async closure as a [`Resolver`].
///
/// ```
/// use depwatch::resolvers::resolver_fn;
///
/// let resolver = resolver_fn(|| async { true });
/// ```
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    FnResolver { f }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn resolve(&self) -> bool {
        (self.f)().await
    }
}

/// Resolver that always reports the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticResolver {
    healthy: bool,
}

impl StaticResolver {
    pub fn new(healthy: bool) -> Self {
        Self { healthy }
    }

    pub fn healthy() -> Self {
        Self::new(true)
    }

    pub fn unhealthy() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self) -> bool {
        self.healthy
    }
}
