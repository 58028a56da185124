//! Queue operation span helpers.

use tracing::Span;

/// Start a span for one queue operation.
///
/// The `queue.outcome` field is declared empty and filled in by
/// [`record_outcome`].
pub fn start_queue_span(queue: &str, operation: &str) -> Span {
    tracing::info_span!(
        "queue.operation",
        "queue.name" = queue,
        "queue.operation" = operation,
        "queue.outcome" = tracing::field::Empty,
    )
}

/// Record how an operation ended on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("queue.outcome", outcome);
}
