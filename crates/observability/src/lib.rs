//! Tracing and logging (shared setup).

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogFormat, UnknownLogFormat};

/// Initialize process-wide tracing with the given output format and filter
/// directives (`None` falls back to `RUST_LOG`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat, directives: Option<&str>) {
    tracing::init(format, directives);
}
