//! Integration tests for telemetry initialization and span helpers.

use memories_sync::model::MemoryId;
use memories_sync::telemetry::{TelemetryConfig, init_telemetry, metrics, sync};
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber per process; a second init may fail.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "memories-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
    }
}

#[test]
fn sync_span_records_outcome() {
    let span = sync::start_sync_span("add", Some(MemoryId(12)));
    sync::record_remote_outcome(&span, "synced");

    let load = sync::start_sync_span("load", None);
    sync::record_remote_outcome(&load, "error");
}

#[test]
fn instruments_are_usable_without_a_provider() {
    metrics::sync_operations().add(
        1,
        &[
            KeyValue::new("operation", "add"),
            KeyValue::new("result", "local"),
        ],
    );
    metrics::gallery_fetches().add(1, &[KeyValue::new("source", "cache")]);
    metrics::cache_lookups().add(1, &[KeyValue::new("result", "miss")]);
    metrics::sync_discrepancies().add(1, &[KeyValue::new("operation", "delete")]);
    metrics::operation_duration_ms().record(3.5, &[KeyValue::new("operation", "load")]);
}
