//! Logging utilities for depwatch components.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the env filter, falling back to `default_level` when RUST_LOG is unset.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a subscriber for tests; repeated calls are ignored.
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(env_filter("debug"))
        .try_init();
}
