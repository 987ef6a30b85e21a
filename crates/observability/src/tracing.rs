//! Tracing/logging initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`). Every entry point uses
//! `try_init`, so only the first call in a process installs a subscriber.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line, with timestamps.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize JSON logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(LogFormat::Json);
}

pub fn init_with(format: LogFormat) {
    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter("info"))
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter("info"))
            .pretty()
            .try_init(),
    };

    if installed.is_ok() {
        ::tracing::debug!(?format, "logging initialized");
    }
}

/// Logging for unit tests: output goes through the test harness capture.
///
/// Defaults to `warn` so failing queries and restarts show up next to a
/// failing test without flooding passing ones.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_test_writer()
        .without_time()
        .try_init();
}
