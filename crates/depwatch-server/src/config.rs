//! Configuration loading and validation for the depwatch server

use depwatch::resolvers::{
    DATADOG_API_URL, DatadogResolver, HttpMonitorSource, HttpResolver, Resolver, StaticResolver,
    TcpResolver,
};
use depwatch::{Dependency, DependencyConfig, DependencyGraph};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Environment variable '{0}' is not set")]
    MissingCredential(String),

    #[error("Invalid dependency graph: {0}")]
    Graph(#[from] common::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub dependencies: Vec<DependencySettings>,

    /// Dependencies registered at top level; empty registers every one
    #[serde(default)]
    pub roots: Vec<String>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.telemetry.validate()?;
        for dependency in &self.dependencies {
            dependency.validate()?;
        }
        Ok(())
    }
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub service_name: String,

    #[validate(length(min = 1))]
    pub otlp_endpoint: String,

    #[serde(default)]
    pub protocol: OtlpProtocol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// Prometheus endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

/// One declared dependency
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DependencySettings {
    #[validate(custom = "validate_name")]
    pub name: String,

    /// Recheck interval; omitted or zero checks once at startup
    #[serde(default, with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[validate(custom = "validate_resolver")]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// How a dependency's own health is determined
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolverSettings {
    Tcp {
        address: SocketAddr,

        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    Http {
        url: String,

        #[serde(default = "default_method")]
        method: String,

        /// Accepted status codes; empty accepts any 2xx
        #[serde(default)]
        expected_codes: Vec<u16>,

        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    Datadog {
        monitor_id: String,

        #[serde(default = "default_api_key_env")]
        api_key_env: String,

        #[serde(default = "default_app_key_env")]
        app_key_env: String,

        #[serde(default = "default_datadog_url")]
        base_url: String,

        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    Static {
        healthy: bool,
    },
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9464".to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "depwatch-server".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: OtlpProtocol::default(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_api_key_env() -> String {
    "DD_API_KEY".to_string()
}

fn default_app_key_env() -> String {
    "DD_APP_KEY".to_string()
}

fn default_datadog_url() -> String {
    DATADOG_API_URL.to_string()
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("name_empty"));
    }
    if trimmed != name || name.chars().any(char::is_control) {
        return Err(ValidationError::new("name_invalid_characters"));
    }
    Ok(())
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() {
        return Ok(());
    }
    let millis = interval.as_millis();
    if millis < 100 || millis > 86_400_000 {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_resolver(resolver: &ResolverSettings) -> Result<(), ValidationError> {
    match resolver {
        ResolverSettings::Tcp { timeout, .. } => validate_timeout(timeout),
        ResolverSettings::Http {
            url,
            method,
            expected_codes,
            timeout,
        } => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::new("http_url_invalid"));
            }
            if reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                return Err(ValidationError::new("http_method_invalid"));
            }
            if expected_codes.iter().any(|&code| !(100..600).contains(&code)) {
                return Err(ValidationError::new("http_status_code_invalid"));
            }
            validate_timeout(timeout)
        }
        ResolverSettings::Datadog {
            monitor_id,
            api_key_env,
            app_key_env,
            timeout,
            ..
        } => {
            if monitor_id.trim().is_empty() {
                return Err(ValidationError::new("datadog_monitor_id_empty"));
            }
            if api_key_env.is_empty() || app_key_env.is_empty() {
                return Err(ValidationError::new("datadog_key_env_empty"));
            }
            validate_timeout(timeout)
        }
        ResolverSettings::Static { .. } => Ok(()),
    }
}

impl ResolverSettings {
    /// Construct the resolver, reading credentials through `env`
    pub fn build<F>(&self, env: F) -> Result<Arc<dyn Resolver>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolver: Arc<dyn Resolver> = match self {
            ResolverSettings::Tcp { address, timeout } => {
                Arc::new(TcpResolver::new(*address, *timeout))
            }
            ResolverSettings::Http {
                url,
                method,
                expected_codes,
                timeout,
            } => {
                let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|e| common::Error::config(format!("HTTP method '{method}': {e}")))?;
                Arc::new(HttpResolver::new(
                    url.clone(),
                    method,
                    expected_codes.clone(),
                    *timeout,
                )?)
            }
            ResolverSettings::Datadog {
                monitor_id,
                api_key_env,
                app_key_env,
                base_url,
                timeout,
            } => {
                let api_key = env(api_key_env)
                    .ok_or_else(|| ConfigError::MissingCredential(api_key_env.clone()))?;
                let app_key = env(app_key_env)
                    .ok_or_else(|| ConfigError::MissingCredential(app_key_env.clone()))?;
                let source =
                    HttpMonitorSource::new(api_key, app_key, *timeout)?.with_base_url(base_url);
                Arc::new(DatadogResolver::with_source(
                    monitor_id.clone(),
                    Arc::new(source),
                ))
            }
            ResolverSettings::Static { healthy } => Arc::new(StaticResolver::new(*healthy)),
        };
        Ok(resolver)
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        Self::search_paths()
            .into_iter()
            .find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Candidate files, highest precedence first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/depwatch/depwatch.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./depwatch.yaml"));
        paths
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/depwatch/depwatch.yaml"))
    }

    /// Build the dependency graph, reading credentials from the process environment
    pub fn build_graph(&self) -> Result<DependencyGraph, ConfigError> {
        self.build_graph_with(|name| std::env::var(name).ok())
    }

    /// Build the dependency graph, reading credentials through `env`
    pub fn build_graph_with<F>(&self, env: F) -> Result<DependencyGraph, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let configs = self
            .dependencies
            .iter()
            .map(|settings| {
                let resolver = settings.resolver.build(&env)?;
                Ok(DependencyConfig::with_resolver(settings.name.clone(), resolver)
                    .interval(settings.interval)
                    .depends_on(settings.depends_on.iter().cloned()))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(DependencyGraph::build(configs)?)
    }

    /// Dependencies to register at top level
    pub fn select_roots(&self, graph: &DependencyGraph) -> Result<Vec<Dependency>, ConfigError> {
        if self.roots.is_empty() {
            return Ok(graph.iter().collect());
        }
        Ok(graph.select(&self.roots)?)
    }
}
