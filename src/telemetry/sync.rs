//! Span helpers for record sync operations.

use tracing::Span;

use crate::model::MemoryId;

/// Start a span for one coordinator operation.
///
/// `sync.outcome` is declared empty and filled by [`record_remote_outcome`].
pub fn start_sync_span(operation: &str, record_id: Option<MemoryId>) -> Span {
    tracing::info_span!(
        "memories.sync",
        "sync.operation" = operation,
        "sync.record_id" = record_id.map(|id| id.0),
        "sync.outcome" = tracing::field::Empty,
    )
}

/// Record how the remote side of an operation ended.
pub fn record_remote_outcome(span: &Span, outcome: &str) {
    span.record("sync.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome, "sync outcome");
    });
}
