//! Main depwatch server implementation.

use crate::config::{Config, ConfigError};
use crate::http_server::StatusServer;
use depwatch::{Manager, MetricsRegistry};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to register dependencies: {0}")]
    Register(#[from] common::Error),

    #[error("HTTP server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dependency monitoring server
pub struct DependencyServer {
    config: Config,
}

impl DependencyServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until ctrl-c
    pub async fn run(self) -> Result<(), ServerError> {
        self.start().await?.run(shutdown_signal()).await
    }

    /// Build the graph, register the roots and bind the listener
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        info!("Starting depwatch server");

        let metrics = if self.config.metrics.enabled {
            info!("Metrics enabled");
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };
        let manager = match metrics {
            Some(ref registry) => Manager::with_metrics(registry.clone()),
            None => Manager::new(),
        };

        let graph = self.config.build_graph()?;
        let roots = self.config.select_roots(&graph)?;
        info!(
            declared = graph.len(),
            roots = roots.len(),
            "Dependency graph built"
        );
        manager.register(None, roots)?;

        let http = match StatusServer::bind(&self.config.server.listen_addr, manager.clone(), metrics)
            .await
        {
            Ok(http) => http,
            Err(e) => {
                manager.shutdown().await;
                return Err(e.into());
            }
        };

        Ok(RunningServer { manager, http })
    }
}

/// Server with registered dependencies and a bound listener
pub struct RunningServer {
    manager: Manager,
    http: StatusServer,
}

impl RunningServer {
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    /// Serve until `shutdown` completes, then stop all dependency checks
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let served = self.http.run(shutdown).await;
        if let Err(ref e) = served {
            warn!(error = %e, "HTTP server error");
        }

        self.manager.shutdown().await;
        info!("depwatch server stopped");
        Ok(served?)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
