//! Process-wide tracing setup shared by saga store binaries.

/// Initialize structured logging for the process.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, output format).
pub mod tracing;
