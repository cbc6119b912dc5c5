use super::config::LogLevel;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives quieting the HTTP stack below the configured level.
const NOISY_CRATES: &[&str] = &["hyper", "reqwest", "h2"];

pub fn build_filter_string(level: LogLevel) -> String {
    let level: tracing::Level = level.into();
    let mut parts = vec![level.to_string().to_lowercase()];
    for target in NOISY_CRATES {
        parts.push(format!("{target}=warn"));
    }
    parts.join(",")
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Safe to call more than once; later calls are no-ops
/// (tests initialize logging repeatedly).
pub fn setup_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(build_filter_string(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init();
}
