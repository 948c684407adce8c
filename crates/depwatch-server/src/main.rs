//! depwatch server binary

use anyhow::Context;
use depwatch_server::{Config, DependencyServer, setup_tracing};

/// Explicit configuration file, overriding the search paths
const CONFIG_ENV: &str = "DEPWATCH_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => Config::load_from_file(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => Config::load().context("loading configuration")?,
    };

    let _telemetry_guard = setup_tracing(&config.logging, &config.telemetry)?;

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        dependencies = config.dependencies.len(),
        "depwatch server starting"
    );

    DependencyServer::new(config).run().await?;

    // Telemetry guard will flush spans on drop

    Ok(())
}
