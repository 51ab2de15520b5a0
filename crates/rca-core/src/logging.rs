//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the given default directive applies.
//! Safe to call more than once: later calls leave the first subscriber in
//! place and return false.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event, with the current span
    Json,
}

/// Install the global subscriber
///
/// Returns true if this call installed it.
pub fn init(format: LogFormat, default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(?format, "logging initialised");
    }
    installed
}

/// Install a test-friendly subscriber writing through the test harness
pub fn init_for_tests() -> bool {
    fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_for_tests();
        assert!(!init(LogFormat::Text, "info"));
        assert!(!init(LogFormat::Json, "info"));
    }
}
