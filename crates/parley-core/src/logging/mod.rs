//! Structured logging with `tracing`.
//!
//! The binary calls [`init_subscriber`] (or [`init_json_subscriber`] when
//! `logging.json` is set) once at startup. Tests use [`capture_logs`].
//!
//! Session context (endpoint, topic, subscription ID) is attached as span
//! and event fields rather than formatted into messages.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set, otherwise `fallback`.
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global compact stderr subscriber. Later calls are no-ops.
pub fn init_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Install the global subscriber emitting one JSON object per line.
pub fn init_json_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_subscriber("warn");
        init_json_subscriber("info");
        init_subscriber("parley_session=debug");
    }

    #[test]
    fn fallback_directive_is_used_without_env() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter("debug").to_string(), "debug");
        }
    }
}
