//! Tracing subscriber setup with optional OpenTelemetry export
//!
//! Installs the process-wide `tracing` subscriber: an env filter, a text or
//! JSON fmt layer, and when enabled a `tracing-opentelemetry` layer that
//! exports spans over OTLP.

use crate::config::{LogFormat, LoggingSettings, OtlpProtocol, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    Exporter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard {
    provider: TracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {e}");
        }
    }
}

/// Build a tracer provider exporting to the configured OTLP endpoint
fn init_provider(settings: &TelemetrySettings) -> Result<TracerProvider, TelemetryError> {
    let exporter = match settings.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&settings.otlp_endpoint)
            .build(),
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&settings.otlp_endpoint)
            .build(),
    }
    .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build())
}

/// Install the global subscriber.
///
/// Must be called from within a tokio runtime when telemetry is enabled.
/// The returned guard must be kept alive for the duration of the program.
pub fn setup_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> Result<Option<TelemetryGuard>, TelemetryError> {
    let level = logging.level.as_deref().unwrap_or("info");
    let json = logging.format.unwrap_or_default() == LogFormat::Json;

    let provider = if telemetry.enabled {
        Some(init_provider(telemetry)?)
    } else {
        None
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(telemetry.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(common::logging::env_filter(level))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(otel_layer)
        .try_init()?;

    match provider {
        Some(provider) => {
            opentelemetry::global::set_tracer_provider(provider.clone());
            tracing::info!(
                service_name = %telemetry.service_name,
                otlp_endpoint = %telemetry.otlp_endpoint,
                "Tracing initialized with OpenTelemetry export"
            );
            Ok(Some(TelemetryGuard { provider }))
        }
        None => {
            tracing::info!(level, json, "Tracing initialized");
            Ok(None)
        }
    }
}
