//! Resolver backed by a Datadog monitor.
//!
//! The monitor's `overall_state` decides health: `"OK"` is healthy, any
//! other state (`Alert`, `Warn`, `No Data`) is unhealthy.
//!
//! Failing to reach Datadog or to parse its answer reports **healthy**. An
//! outage of the monitoring path must not mark the monitored service down;
//! those failures are logged at `warn` and should be watched separately.
//!
//! This includes answers Datadog itself rejects. A non-2xx status, such as
//! the 403 returned for a wrong API or application key, is a failed fetch,
//! and so is a body without `overall_state` (for example
//! `{"errors": ["Forbidden"]}`). Misconfigured credentials therefore read
//! as healthy on every check; only the `warn` log shows them.

use super::Resolver;
use async_trait::async_trait;
use common::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Datadog API endpoint.
pub const DATADOG_API_URL: &str = "https://api.datadoghq.com";

/// Fields of interest from the monitor details endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorDetails {
    pub overall_state: String,
}

/// Source of monitor details.
#[async_trait]
pub trait MonitorSource: Send + Sync {
    async fn fetch(&self, monitor_id: &str) -> Result<MonitorDetails>;
}

/// Fetches monitor details from the Datadog HTTP API.
pub struct HttpMonitorSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    app_key: String,
}

impl HttpMonitorSource {
    pub fn new(
        api_key: impl Into<String>,
        app_key: impl Into<String>,
        timeout_duration: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(Error::http)?;

        Ok(Self {
            client,
            base_url: DATADOG_API_URL.to_string(),
            api_key: api_key.into(),
            app_key: app_key.into(),
        })
    }

    /// Point the source at a different API host, e.g. an EU site.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn monitor_url(&self, monitor_id: &str) -> String {
        format!(
            "{}/api/v1/monitor/{}",
            self.base_url.trim_end_matches('/'),
            monitor_id
        )
    }

    /// Authenticated request for a monitor's details.
    pub fn request(&self, monitor_id: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.monitor_url(monitor_id))
            .header("Content-Type", "application/json")
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
    }
}

#[async_trait]
impl MonitorSource for HttpMonitorSource {
    async fn fetch(&self, monitor_id: &str) -> Result<MonitorDetails> {
        let response = self
            .request(monitor_id)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::http)?;
        let body = response.bytes().await.map_err(Error::http)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Reports the health of a Datadog monitor.
pub struct DatadogResolver {
    monitor_id: String,
    source: Arc<dyn MonitorSource>,
}

impl DatadogResolver {
    /// Resolver querying the public Datadog API.
    pub fn new(
        monitor_id: impl Into<String>,
        api_key: impl Into<String>,
        app_key: impl Into<String>,
        timeout_duration: Duration,
    ) -> Result<Self> {
        let monitor_id = monitor_id.into();
        if monitor_id.trim().is_empty() {
            return Err(Error::resolver("Datadog monitor id must not be empty"));
        }
        let source = HttpMonitorSource::new(api_key, app_key, timeout_duration)?;
        Ok(Self::with_source(monitor_id, Arc::new(source)))
    }

    /// Resolver reading monitor details from `source`.
    pub fn with_source(monitor_id: impl Into<String>, source: Arc<dyn MonitorSource>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            source,
        }
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }
}

#[async_trait]
impl Resolver for DatadogResolver {
    async fn resolve(&self) -> bool {
        match self.source.fetch(&self.monitor_id).await {
            Ok(details) => {
                debug!(monitor_id = %self.monitor_id, state = %details.overall_state, "Datadog monitor state");
                details.overall_state == "OK"
            }
            Err(e) => {
                warn!(
                    monitor_id = %self.monitor_id,
                    error = %e,
                    "Unable to process Datadog response, reporting healthy"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Result<MonitorDetails>);

    #[async_trait]
    impl MonitorSource for FixedSource {
        async fn fetch(&self, _monitor_id: &str) -> Result<MonitorDetails> {
            match &self.0 {
                Ok(details) => Ok(details.clone()),
                Err(e) => Err(Error::http(e)),
            }
        }
    }

    fn resolver_with(result: Result<MonitorDetails>) -> DatadogResolver {
        DatadogResolver::with_source("12345", Arc::new(FixedSource(result)))
    }

    fn state(overall_state: &str) -> Result<MonitorDetails> {
        Ok(MonitorDetails {
            overall_state: overall_state.to_string(),
        })
    }

    #[tokio::test]
    async fn test_ok_monitor_is_healthy() {
        assert!(resolver_with(state("OK")).resolve().await);
    }

    #[tokio::test]
    async fn test_alerting_monitor_is_unhealthy() {
        assert!(!resolver_with(state("Alert")).resolve().await);
        assert!(!resolver_with(state("Warn")).resolve().await);
        assert!(!resolver_with(state("No Data")).resolve().await);
    }

    #[tokio::test]
    async fn test_unreachable_datadog_reports_healthy() {
        let resolver = resolver_with(Err(Error::http("connection refused")));
        assert!(resolver.resolve().await);
    }

    #[test]
    fn test_request_is_authenticated() {
        let source = HttpMonitorSource::new("api-key", "app-key", Duration::from_secs(1)).unwrap();
        let request = source.request("12345").build().unwrap();

        assert_eq!(request.method(), &reqwest::Method::GET);
        assert_eq!(request.url().host_str(), Some("api.datadoghq.com"));
        assert_eq!(request.url().path(), "/api/v1/monitor/12345");

        let headers = request.headers();
        assert_eq!(headers["Content-Type"], "application/json");
        assert_eq!(headers["DD-API-KEY"], "api-key");
        assert_eq!(headers["DD-APPLICATION-KEY"], "app-key");
    }

    #[test]
    fn test_empty_monitor_id_is_rejected() {
        let err = DatadogResolver::new(" ", "a", "b", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, Error::Resolver(_)));
    }

    #[test]
    fn test_base_url_override() {
        let source = HttpMonitorSource::new("a", "b", Duration::from_secs(1))
            .unwrap()
            .with_base_url("https://api.datadoghq.eu/");
        assert_eq!(
            source.monitor_url("7"),
            "https://api.datadoghq.eu/api/v1/monitor/7"
        );
    }

    #[test]
    fn test_monitor_details_ignores_extra_fields() {
        let details: MonitorDetails =
            serde_json::from_str(r#"{"id": 12345, "overall_state": "OK", "name": "db"}"#).unwrap();
        assert_eq!(details.overall_state, "OK");
    }

    #[tokio::test]
    async fn test_http_source_failure_reports_healthy() {
        let source = HttpMonitorSource::new("a", "b", Duration::from_millis(200))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let resolver = DatadogResolver::with_source("1", Arc::new(source));
        assert!(resolver.resolve().await);
    }

    #[tokio::test]
    async fn test_rejected_credentials_report_healthy() {
        let app = axum::Router::new().fallback(|| async {
            (
                axum::http::StatusCode::FORBIDDEN,
                r#"{"errors": ["Forbidden"]}"#,
            )
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let source = HttpMonitorSource::new("bad", "keys", Duration::from_secs(1))
            .unwrap()
            .with_base_url(format!("http://{addr}"));
        assert!(source.fetch("1").await.is_err());

        let resolver = DatadogResolver::with_source("1", Arc::new(source));
        assert!(resolver.resolve().await);
        server.abort();
    }

    #[test]
    fn test_error_body_is_not_monitor_details() {
        let parsed = serde_json::from_str::<MonitorDetails>(r#"{"errors": ["Forbidden"]}"#);
        assert!(parsed.is_err());
    }
}
