//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide logging (JSON, filtered by `RUST_LOG`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, formats, test capture).
pub mod tracing;

pub use self::tracing::{LogFormat, init_for_tests, init_with};
