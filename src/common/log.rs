//! Structured logging setup.
//!
//! Event field contract used across the client:
//! - `fingerprint` once the dataset identity is known.
//! - `algorithm` and `metric` on anything scoped to one evaluation.
//! - `dur_ms` on timed steps.

use tracing_subscriber::EnvFilter;

use crate::common::config::AppCfg;

/// Resolve the filter from `CAMELS_LOG`, then `RUST_LOG`, then the configured default.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env("CAMELS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(cfg: &AppCfg) {
    let filter = env_filter(&cfg.log_filter);
    let result = if cfg.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
