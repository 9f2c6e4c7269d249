//! Smoke tests for the full observability stack.
//!
//! These need an OTLP collector on localhost:4317 feeding Tempo (3200),
//! Prometheus (9090) and Loki (3100).
//!
//! Run with:
//! ```sh
//! cargo test --test telemetry_smoke_test -- --ignored --nocapture
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use memories_sync::model::MemoryId;
use memories_sync::telemetry::{self, TelemetryConfig, TelemetryGuard};
use opentelemetry::KeyValue;

const SERVICE: &str = "memories-smoke-test";

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        telemetry::init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            service_name: SERVICE.to_string(),
            log_level: "info".to_string(),
        })
        .expect("failed to init telemetry")
    })
}

async fn flush_and_wait(guard: &TelemetryGuard) {
    guard.force_flush();
    tokio::time::sleep(Duration::from_secs(8)).await;
}

async fn query(url: &str, params: &[(&str, &str)]) -> serde_json::Value {
    let resp = reqwest::Client::new()
        .get(url)
        .query(params)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to query {url}: {e}"));
    assert!(resp.status().is_success(), "{url}: {}", resp.status());
    resp.json().await.expect("response is not JSON")
}

#[test]
#[ignore]
fn smoke_traces() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        {
            let span = telemetry::sync::start_sync_span("add", Some(MemoryId(1)));
            let _enter = span.enter();
            telemetry::sync::record_remote_outcome(&span, "synced");
        }
        flush_and_wait(guard).await;

        let tags = format!("service.name={SERVICE}");
        let body = query(
            "http://localhost:3200/api/search",
            &[("tags", tags.as_str()), ("limit", "5")],
        )
        .await;
        let traces = body["traces"].as_array();
        assert!(
            traces.is_some_and(|t| !t.is_empty()),
            "expected traces in Tempo, got: {body}"
        );
    });
}

#[test]
#[ignore]
fn smoke_metrics() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        telemetry::metrics::sync_operations().add(
            2,
            &[
                KeyValue::new("operation", "add"),
                KeyValue::new("result", "synced"),
            ],
        );
        telemetry::metrics::operation_duration_ms()
            .record(42.5, &[KeyValue::new("operation", "add")]);
        flush_and_wait(guard).await;

        let body = query(
            "http://localhost:9090/api/v1/query",
            &[("query", "memories_sync_operations_total")],
        )
        .await;
        let results = body["data"]["result"].as_array();
        assert!(
            results.is_some_and(|r| !r.is_empty()),
            "expected metric results in Prometheus, got: {body}"
        );
    });
}

#[test]
#[ignore]
fn smoke_logs() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        tracing::info!(component = "smoke-test", "smoke test info log");
        tracing::warn!(component = "smoke-test", "smoke test warning log");
        flush_and_wait(guard).await;

        let selector = format!(r#"{{service_name="{SERVICE}"}}"#);
        let body = query(
            "http://localhost:3100/loki/api/v1/query_range",
            &[("query", selector.as_str()), ("limit", "10")],
        )
        .await;
        let streams = body["data"]["result"].as_array();
        assert!(
            streams.is_some_and(|s| !s.is_empty()),
            "expected log streams in Loki, got: {body}"
        );
    });
}
