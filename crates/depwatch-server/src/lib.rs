//! depwatch server
//!
//! Hosts a [`depwatch::Manager`] built from a YAML file and serves its
//! cached results over HTTP.
//!
//! # Endpoints
//!
//! - `GET /dependencies`: last known health of every checked dependency
//! - `GET /dependencies/graph`: registered edges
//! - `GET /status`: overall health, 503 when any dependency is unhealthy
//! - `GET /metrics`: Prometheus text, when metrics are enabled

pub mod config;
pub mod http_server;
pub mod server;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use http_server::{StatusServer, router};
pub use server::{DependencyServer, RunningServer, ServerError};
pub use telemetry::{TelemetryGuard, setup_tracing};
