//! The owner thread: sole holder of the record list.
//!
//! Every list mutation arrives as a [`Command`] and is applied in arrival
//! order. A mutation is persisted before it becomes visible: the new list
//! is built aside, written to the [`LocalStore`], and only then swapped in
//! and published. A failed write leaves both the list and the file as
//! they were.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::event::{SyncEvent, SyncEventKind};
use crate::model::{MemoryId, MemoryRecord, Profile};
use crate::storage::LocalStore;

pub(crate) type Snapshot = Arc<Vec<MemoryRecord>>;

const COMMAND_BUFFER: usize = 64;

pub(crate) enum Command {
    /// Mint an id for a new record.
    ReserveId { reply: oneshot::Sender<MemoryId> },
    /// Replace the list with `remote ++ (local - remote ids)`.
    Merge {
        remote: Vec<MemoryRecord>,
        reply: oneshot::Sender<Result<Vec<MemoryRecord>>>,
    },
    Insert {
        record: MemoryRecord,
        synced: bool,
        reply: oneshot::Sender<Result<MemoryRecord>>,
    },
    /// Swap the stored copy with the same id.
    Replace {
        record: MemoryRecord,
        synced: bool,
        reply: oneshot::Sender<Result<Option<MemoryRecord>>>,
    },
    Remove {
        id: MemoryId,
        remote_deleted: bool,
        reply: oneshot::Sender<Result<Option<MemoryRecord>>>,
    },
    /// Note a remote write that did not land.
    Discrepancy {
        id: MemoryId,
        operation: &'static str,
        error: String,
        transient: bool,
    },
    LoadProfile { reply: oneshot::Sender<Result<Profile>> },
    SaveProfile {
        profile: Profile,
        reply: oneshot::Sender<Result<()>>,
    },
}

pub(crate) struct Owner {
    records: Vec<MemoryRecord>,
    store: LocalStore,
    next_id: i64,
    seq: u64,
    snapshot: watch::Sender<Snapshot>,
    events: broadcast::Sender<SyncEvent>,
}

impl Owner {
    /// Start the owner thread over `records`.
    ///
    /// Returns the command sender and a receiver for published snapshots.
    /// The thread exits once every sender is dropped.
    pub(crate) fn spawn(
        store: LocalStore,
        mut records: Vec<MemoryRecord>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Result<(mpsc::Sender<Command>, watch::Receiver<Snapshot>)> {
        sort_by_name(&mut records);
        let next_id = next_id_after(&records, 1);
        let (snapshot, snapshot_rx) = watch::channel(Arc::new(records.clone()));
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        let mut owner = Owner {
            records,
            store,
            next_id,
            seq: 0,
            snapshot,
            events,
        };
        owner.emit(SyncEventKind::Loaded {
            count: owner.records.len(),
        });

        std::thread::Builder::new()
            .name("memories-owner".into())
            .spawn(move || owner.run(rx))?;
        Ok((tx, snapshot_rx))
    }

    fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(records = self.records.len(), "owner started");
        while let Some(command) = rx.blocking_recv() {
            self.handle(command);
        }
        debug!("owner stopped");
    }

    fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller gave up; the mutation
        // itself still stands.
        match command {
            Command::ReserveId { reply } => {
                let id = mint_id(self.next_id, Utc::now().timestamp_millis(), random_bits());
                self.next_id = id.0 + 1;
                let _ = reply.send(id);
            }
            Command::Merge { remote, reply } => {
                let _ = reply.send(self.merge(remote));
            }
            Command::Insert {
                record,
                synced,
                reply,
            } => {
                let _ = reply.send(self.insert(record, synced));
            }
            Command::Replace {
                record,
                synced,
                reply,
            } => {
                let _ = reply.send(self.replace(record, synced));
            }
            Command::Remove {
                id,
                remote_deleted,
                reply,
            } => {
                let _ = reply.send(self.remove(id, remote_deleted));
            }
            Command::Discrepancy {
                id,
                operation,
                error,
                transient,
            } => {
                self.emit(SyncEventKind::SyncDiscrepancy {
                    id,
                    operation: operation.to_string(),
                    error,
                    transient,
                });
            }
            Command::LoadProfile { reply } => {
                let _ = reply.send(self.store.load_profile());
            }
            Command::SaveProfile { profile, reply } => {
                let saved = self.store.save_profile(&profile);
                if saved.is_ok() {
                    self.emit(SyncEventKind::ProfileSaved);
                }
                let _ = reply.send(saved);
            }
        }
    }

    fn merge(&mut self, remote: Vec<MemoryRecord>) -> Result<Vec<MemoryRecord>> {
        let mut seen = HashSet::with_capacity(remote.len());
        let mut next = Vec::with_capacity(remote.len() + self.records.len());
        for mut record in remote {
            if !seen.insert(record.id) {
                debug!(record_id = %record.id, "duplicate remote document ignored");
                continue;
            }
            // The backup path is device state the remote never carries.
            if let Some(local) = self
                .records
                .iter()
                .find(|r| r.id == record.id && r.gallery.profile() == record.gallery.profile())
            {
                record.profile_backup = local.profile_backup.clone();
            }
            next.push(record);
        }
        let remote_count = next.len();
        next.extend(
            self.records
                .iter()
                .filter(|r| !seen.contains(&r.id))
                .cloned(),
        );
        let local_kept = next.len() - remote_count;

        self.commit(next)?;
        self.next_id = next_id_after(&self.records, self.next_id);
        info!(remote = remote_count, local_kept, "merged remote records");
        self.emit(SyncEventKind::Merged {
            remote: remote_count,
            local_kept,
        });
        Ok(self.records.clone())
    }

    fn insert(&mut self, record: MemoryRecord, synced: bool) -> Result<MemoryRecord> {
        let id = record.id;
        let mut next = self.records.clone();
        next.retain(|r| r.id != id);
        next.push(record.clone());
        self.commit(next)?;
        self.next_id = self.next_id.max(id.0 + 1);
        self.emit(SyncEventKind::RecordAdded { id, synced });
        Ok(record)
    }

    fn replace(&mut self, mut record: MemoryRecord, synced: bool) -> Result<Option<MemoryRecord>> {
        let id = record.id;
        let Some(pos) = self.records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let stored = &self.records[pos];
        // A backup only stands in for the profile image it was taken from.
        if stored.gallery.profile() != record.gallery.profile()
            && record.profile_backup == stored.profile_backup
        {
            record.profile_backup = None;
        }
        let mut next = self.records.clone();
        next[pos] = record.clone();
        self.commit(next)?;
        self.emit(SyncEventKind::RecordUpdated { id, synced });
        Ok(Some(record))
    }

    fn remove(&mut self, id: MemoryId, remote_deleted: bool) -> Result<Option<MemoryRecord>> {
        let Some(pos) = self.records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let mut next = self.records.clone();
        let removed = next.remove(pos);
        self.commit(next)?;
        self.emit(SyncEventKind::RecordDeleted { id, remote_deleted });
        Ok(Some(removed))
    }

    /// Sort, persist, then swap in and publish.
    fn commit(&mut self, mut next: Vec<MemoryRecord>) -> Result<()> {
        sort_by_name(&mut next);
        if let Err(e) = self.store.save_memories(&next) {
            error!(error = %e, "failed to persist records, change dropped");
            return Err(e);
        }
        self.records = next;
        self.snapshot.send_replace(Arc::new(self.records.clone()));
        Ok(())
    }

    fn emit(&mut self, kind: SyncEventKind) {
        self.seq += 1;
        // No subscribers is fine.
        let _ = self.events.send(SyncEvent {
            seq: self.seq,
            timestamp: Utc::now(),
            kind,
        });
    }
}

/// Stable, case-insensitive sort by name.
pub(crate) fn sort_by_name(records: &mut [MemoryRecord]) {
    records.sort_by_cached_key(MemoryRecord::sort_key);
}

/// Low bits of a minted id that come from randomness.
const ID_RANDOM_BITS: u32 = 10;

/// Id for a new record: milliseconds since the epoch in the high bits and
/// random low bits, never below `floor`.
///
/// Devices that have not seen each other's records still mint distinct
/// ids, so a record created offline survives the next merge.
fn mint_id(floor: i64, now_millis: i64, random: u16) -> MemoryId {
    let mask = (1i64 << ID_RANDOM_BITS) - 1;
    let stamped = (now_millis.max(0) << ID_RANDOM_BITS) | (i64::from(random) & mask);
    MemoryId(stamped.max(floor))
}

fn random_bits() -> u16 {
    uuid::Uuid::new_v4().as_u128() as u16
}

fn next_id_after(records: &[MemoryRecord], floor: i64) -> i64 {
    records
        .iter()
        .map(|r| r.id.0 + 1)
        .max()
        .unwrap_or(floor)
        .max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, MemoryDraft};

    fn record(id: i64, name: &str) -> MemoryRecord {
        MemoryDraft::new(name, Category::Travel).into_record(MemoryId(id))
    }

    #[test]
    fn name_sort_ignores_case_and_is_stable() {
        let mut records = vec![
            record(1, "beta"),
            record(2, "Alpha"),
            record(3, "alpha"),
            record(4, "Beta"),
        ];
        sort_by_name(&mut records);
        let ids: Vec<i64> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[test]
    fn next_id_is_past_the_largest() {
        let records = vec![record(7, "a"), record(1003, "b"), record(12, "c")];
        assert_eq!(next_id_after(&records, 1), 1004);
        assert_eq!(next_id_after(&[], 1), 1);
        assert_eq!(next_id_after(&records, 2000), 2000);
    }

    #[test]
    fn minted_ids_carry_time_and_respect_the_floor() {
        let now = 1_760_000_000_000;
        let id = mint_id(1, now, 0x3ff);
        assert_eq!(id.0 >> ID_RANDOM_BITS, now);
        assert_eq!(id.0 & 0x3ff, 0x3ff);

        let later = mint_id(id.0 + 1, now, 0);
        assert_eq!(later, MemoryId(id.0 + 1));

        assert_eq!(mint_id(1, 5, 0xffff).0 & !0x3ff, 5 << ID_RANDOM_BITS);
    }

    #[test]
    fn replacing_the_profile_drops_its_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path()).unwrap();
        let mut stored = record(1, "Lisbon");
        stored.gallery = vec![crate::model::ImageRef::remote("mem://old")].into();
        stored.profile_backup = Some("/images/old.jpg".into());
        let (events, _) = broadcast::channel(8);
        let mut owner = Owner {
            records: vec![stored.clone()],
            store,
            next_id: 2,
            seq: 0,
            snapshot: watch::channel(Arc::new(Vec::new())).0,
            events,
        };

        let mut appended = stored.clone();
        appended.gallery.push(crate::model::ImageRef::remote("mem://extra"));
        let kept = owner.replace(appended, true).unwrap().unwrap();
        assert_eq!(kept.profile_backup, stored.profile_backup);

        let mut swapped = kept.clone();
        swapped.gallery.set_profile(crate::model::ImageRef::remote("mem://new"));
        let cleared = owner.replace(swapped, true).unwrap().unwrap();
        assert!(cleared.profile_backup.is_none());
    }
}
