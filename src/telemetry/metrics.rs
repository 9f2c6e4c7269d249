//! Metric instruments for memories-sync.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an exporter installed these are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("memories-sync")
}

/// Counter: record lifecycle operations.
/// Labels: `operation` ("load" | "add" | "update" | "delete"),
/// `result` ("synced" | "local" | "error").
pub fn sync_operations() -> Counter<u64> {
    meter()
        .u64_counter("memories.sync.operations")
        .with_description("Record lifecycle operations by outcome")
        .build()
}

/// Counter: gallery images resolved.
/// Labels: `source` ("local" | "backup" | "cache" | "network" | "failed").
pub fn gallery_fetches() -> Counter<u64> {
    meter()
        .u64_counter("memories.gallery.fetches")
        .with_description("Gallery images resolved, by source")
        .build()
}

/// Counter: image cache lookups.
/// Labels: `result` ("hit" | "miss").
pub fn cache_lookups() -> Counter<u64> {
    meter()
        .u64_counter("memories.cache.lookups")
        .with_description("Image cache lookups")
        .build()
}

/// Counter: remote failures absorbed by a local fallback.
/// Labels: `operation`.
pub fn sync_discrepancies() -> Counter<u64> {
    meter()
        .u64_counter("memories.sync.discrepancies")
        .with_description("Local changes the remote store did not accept")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("memories.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
