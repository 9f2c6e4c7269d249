//! Structured events emitted by the coordinator's owner thread.
//!
//! One event per list mutation, plus one for every remote failure that a
//! local fallback absorbed. Observers subscribe through
//! [`SyncCoordinator::events`](crate::engine::SyncCoordinator::events).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::MemoryId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: SyncEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    /// Local snapshot loaded at startup.
    Loaded { count: usize },
    /// Remote set merged into the list.
    Merged {
        remote: usize,
        local_kept: usize,
    },
    RecordAdded { id: MemoryId, synced: bool },
    RecordUpdated { id: MemoryId, synced: bool },
    RecordDeleted { id: MemoryId, remote_deleted: bool },
    /// A local change the remote store did not accept.
    SyncDiscrepancy {
        id: MemoryId,
        operation: String,
        error: String,
        /// Whether a later retry may succeed.
        #[serde(default)]
        transient: bool,
    },
    ProfileSaved,
}
