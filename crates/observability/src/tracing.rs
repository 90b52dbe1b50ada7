//! Tracing subscriber initialization.
//!
//! JSON lines on stdout, filtered through `RUST_LOG` (default `info`). Saga store
//! spans carry `saga_id` and `correlation_key` fields, so every event logged inside
//! an operation is attributable to the saga it touched.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global JSON subscriber.
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// Install the global JSON subscriber, using `default_filter` when `RUST_LOG` is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with_default(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_with_default("debug");
        assert!(!init_with_default("debug"));
    }
}
