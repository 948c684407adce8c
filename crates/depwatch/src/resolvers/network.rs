//! Resolvers that probe a network endpoint directly.
//!
//! The probed endpoint is the dependency itself, so failing to reach it is
//! reported as unhealthy.

use super::Resolver;
use async_trait::async_trait;
use common::{Error, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Healthy when a TCP connection can be opened within the timeout.
pub struct TcpResolver {
    target: SocketAddr,
    timeout_duration: Duration,
}

impl TcpResolver {
    pub fn new(target: SocketAddr, timeout_duration: Duration) -> Self {
        Self {
            target,
            timeout_duration,
        }
    }
}

#[async_trait]
impl Resolver for TcpResolver {
    async fn resolve(&self) -> bool {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect(self.target)).await {
            Ok(Ok(_stream)) => {
                debug!(target = %self.target, duration_ms = start.elapsed().as_millis(), "TCP probe connected");
                true
            }
            Ok(Err(e)) => {
                warn!(target = %self.target, error = %e, "TCP probe failed");
                false
            }
            Err(_) => {
                warn!(target = %self.target, timeout_ms = self.timeout_duration.as_millis(), "TCP probe timed out");
                false
            }
        }
    }
}

/// Healthy when the endpoint answers with an expected status code.
///
/// With no expected codes configured, any 2xx status counts as healthy.
pub struct HttpResolver {
    url: String,
    method: reqwest::Method,
    expected_codes: Vec<u16>,
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new(
        url: impl Into<String>,
        method: reqwest::Method,
        expected_codes: Vec<u16>,
        timeout_duration: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(Error::http)?;

        Ok(Self {
            url: url.into(),
            method,
            expected_codes,
            timeout_duration,
            client,
        })
    }

    fn is_expected(&self, status: u16) -> bool {
        if self.expected_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.expected_codes.contains(&status)
        }
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self) -> bool {
        let start = Instant::now();
        let request = self.client.request(self.method.clone(), &self.url);

        match timeout(self.timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                if self.is_expected(status) {
                    debug!(url = %self.url, status, duration_ms = start.elapsed().as_millis(), "HTTP probe succeeded");
                    true
                } else {
                    warn!(url = %self.url, status, "HTTP probe returned unexpected status");
                    false
                }
            }
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "HTTP probe failed");
                false
            }
            Err(_) => {
                warn!(url = %self.url, "HTTP probe timed out");
                false
            }
        }
    }
}
