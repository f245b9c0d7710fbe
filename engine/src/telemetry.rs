//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. The log level comes
//! from configuration, with `RUST_LOG` taking precedence when set. Debug
//! builds get pretty terminal output; release builds emit JSON with spans.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Initialize the tracing subscriber from loaded configuration.
///
/// Reads `core.log_level` from the config. Safe to call more than once;
/// later calls are no-ops.
pub fn init_telemetry(config: &Config) {
    init_telemetry_with_level(&config.core.log_level);
}

/// Initialize the tracing subscriber with an explicit log level.
///
/// `RUST_LOG` overrides the given level when present.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = format!("{},colloquy_engine={}", log_level, log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    install(env_filter);
}

#[cfg(debug_assertions)]
fn install(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty().with_target(false))
        .try_init()
        .ok();
}

#[cfg(not(debug_assertions))]
fn install(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_current_span(true))
        .try_init()
        .ok();
}
