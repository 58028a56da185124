//! Integration tests for telemetry initialization and span helpers.

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = sqlq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "sqlq-test".to_string(),
        log_level: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = sqlq::telemetry::init_telemetry(config);
}

#[test]
fn queue_span_creates_and_records_outcome() {
    let span = sqlq::telemetry::queue::start_queue_span("orders", "claim");
    sqlq::telemetry::queue::record_outcome(&span, "ok");
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;

    sqlq::telemetry::metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", "orders"),
            KeyValue::new("operation", "enqueue"),
        ],
    );
    sqlq::telemetry::metrics::operation_duration_ms().record(1.5, &[]);
}

#[test]
fn operation_labels_cover_the_queue_surface() {
    use sqlq::telemetry::metrics::OPERATIONS;

    for operation in [
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
    ] {
        assert!(OPERATIONS.contains(&operation), "missing {operation}");
    }
    assert_eq!(OPERATIONS.len(), 10);
    assert!(!OPERATIONS.contains(&"claim_empty"));
}
