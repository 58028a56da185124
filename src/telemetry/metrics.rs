//! Metric instrument factories for sqlq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"sqlq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for sqlq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("sqlq")
}

/// Values of the `operation` label. An empty claim is `claim` with
/// outcome `ok`.
pub const OPERATIONS: &[&str] = &[
    "create",
    "drop",
    "purge",
    "exists",
    "count",
    "is_empty",
    "enqueue",
    "claim",
    "acknowledge",
    "release",
];

/// Counter: queue-level operations.
/// Labels: `queue`, `operation` (one of [`OPERATIONS`]), `outcome`
/// ("ok" | "cancelled" | "error").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("sqlq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: orphaned claims cleared by start-up recovery.
/// Labels: `queue`.
pub fn recovered_claims() -> Counter<u64> {
    meter()
        .u64_counter("sqlq.queue.recovered_claims")
        .with_description("Claims released by crash recovery")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("sqlq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
