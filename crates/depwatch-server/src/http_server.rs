//! HTTP endpoints for dependency status, the dependency graph and metrics.

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use depwatch::{DependencyStatus, Edge, Manager, MetricsRegistry, StatusCache};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    manager: Manager,
    metrics: Option<Arc<MetricsRegistry>>,
}

/// Aggregated view served on `/status`
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    /// Every checked dependency is healthy
    pub healthy: bool,
    pub dependencies: BTreeMap<String, bool>,
}

impl StatusSummary {
    pub fn from_cache(cache: &StatusCache) -> Self {
        let dependencies = cache.to_map();
        Self {
            healthy: dependencies.values().all(|&healthy| healthy),
            dependencies,
        }
    }
}

/// Router with the status endpoints, and `/metrics` when a registry is given
pub fn router(manager: Manager, metrics: Option<Arc<MetricsRegistry>>) -> Router {
    let mut app = Router::new()
        .route("/dependencies", get(dependencies_handler))
        .route("/dependencies/graph", get(graph_handler))
        .route("/status", get(status_handler));

    if metrics.is_some() {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(manager.middleware()),
    )
    .with_state(AppState { manager, metrics })
}

/// HTTP server for the status endpoints
pub struct StatusServer {
    listener: TcpListener,
    app: Router,
}

impl StatusServer {
    /// Bind the listen address
    pub async fn bind(
        listen_addr: &str,
        manager: Manager,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!(listen_addr = %listener.local_addr()?, "Status server listening");
        Ok(Self {
            listener,
            app: router(manager, metrics),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn dependencies_handler(State(state): State<AppState>) -> Json<Vec<DependencyStatus>> {
    Json(state.manager.dependency_status_list())
}

async fn graph_handler(State(state): State<AppState>) -> Json<Vec<Edge>> {
    Json(state.manager.adjacency_list())
}

/// 200 when every checked dependency is healthy, 503 otherwise
async fn status_handler(Extension(cache): Extension<StatusCache>) -> Response {
    let summary = StatusSummary::from_cache(&cache);
    let code = if summary.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(summary)).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(registry) = state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match registry.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use depwatch::resolvers::StaticResolver;
    use depwatch::{Dependency, ROOT};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn fetch(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_dependencies_lists_cached_status() {
        let manager = Manager::new();
        manager.status_cache().set("db", true);
        manager.status_cache().set("queue", false);

        let (status, body) = fetch(router(manager, None), "/dependencies").await;
        assert_eq!(status, StatusCode::OK);

        let list: Vec<DependencyStatus> = serde_json::from_str(&body).unwrap();
        assert_eq!(
            list,
            vec![
                DependencyStatus { name: "db".into(), healthy: true },
                DependencyStatus { name: "queue".into(), healthy: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_graph_lists_edges() {
        let manager = Manager::new();
        manager
            .register(None, [Dependency::leaf("dep", StaticResolver::healthy(), Duration::ZERO)])
            .unwrap();

        let (status, body) = fetch(router(manager.clone(), None), "/dependencies/graph").await;
        assert_eq!(status, StatusCode::OK);

        let edges: Vec<Edge> = serde_json::from_str(&body).unwrap();
        assert_eq!(edges, vec![Edge::new(ROOT, "dep")]);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_reflects_cache() {
        let manager = Manager::new();
        let cache = manager.status_cache();
        let app = router(manager, None);

        let (status, body) = fetch(app.clone(), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"healthy":true,"dependencies":{}}"#);

        cache.set("db", false);
        let (status, body) = fetch(app, "/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, r#"{"healthy":false,"dependencies":{"db":false}}"#);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.record_check("db", true, Duration::from_millis(3));

        let (status, body) = fetch(router(Manager::new(), Some(metrics)), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("depwatch_checks_total"));
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let (status, _) = fetch(router(Manager::new(), None), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
