//! Tracing and logging setup shared by stockledger binaries.

/// Log target for ledger integrity violations.
///
/// Events on this target mean stored data is inconsistent and need an operator, not a
/// retry. Route it to alerting separately from ordinary error logs.
pub const INTEGRITY_TARGET: &str = "stockledger::integrity";

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogFormat;
