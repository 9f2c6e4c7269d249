//! Sync coordinator: the record lifecycle against local and remote stores.
//!
//! [`SyncCoordinator`] is a cloneable handle. Remote calls run on the
//! caller's task; the resulting list change is sent to the owner thread,
//! which persists it and publishes a new snapshot. Remote failures fall
//! back to a local-only change and are reported, never allowed to block
//! local persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use super::gallery::{Appended, FailedUpload, GalleryManager};
use super::owner::{Command, Owner, Snapshot};
use crate::cache::ImageCache;
use crate::error::{Error, Result};
use crate::event::SyncEvent;
use crate::model::{
    ImageCollection, ImageRef, MemoryDocument, MemoryDraft, MemoryId, MemoryRecord, Origin,
    Profile, RemoteDocument,
};
use crate::remote::RemotePort;
use crate::storage::LocalStore;
use crate::telemetry::metrics;
use crate::telemetry::sync::{record_remote_outcome, start_sync_span};

const EVENT_CAPACITY: usize = 256;

/// How the remote side of an operation ended.
#[derive(Debug)]
pub enum RemoteOutcome {
    Synced,
    /// The record has no remote counterpart; nothing was attempted.
    LocalOnly,
    /// The remote call failed. The local change was applied anyway.
    Failed(Error),
}

impl RemoteOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, RemoteOutcome::Synced)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            RemoteOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RemoteOutcome::Synced => "synced",
            RemoteOutcome::LocalOnly => "local",
            RemoteOutcome::Failed(_) => "error",
        }
    }
}

/// Result of [`SyncCoordinator::update`].
#[derive(Debug)]
pub struct UpdateOutcome {
    /// The record as now stored.
    pub record: MemoryRecord,
    pub remote: RemoteOutcome,
    /// New images that did not upload. Retry just these.
    pub failed_uploads: Vec<FailedUpload>,
}

/// Result of [`SyncCoordinator::load_all`].
///
/// `local` is available at once. The remote merge finishes in the
/// background whether or not [`merged`](Self::merged) is awaited.
pub struct LoadAll {
    pub local: Vec<MemoryRecord>,
    merge: JoinHandle<Result<Vec<MemoryRecord>>>,
}

impl LoadAll {
    /// Wait for the remote fetch and merge.
    ///
    /// On a remote failure the local list stays authoritative and the
    /// error is returned.
    pub async fn merged(self) -> Result<Vec<MemoryRecord>> {
        self.merge
            .await
            .map_err(|e| Error::Other(format!("merge task failed: {e}")))?
    }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    events: broadcast::Sender<SyncEvent>,
    remote: Arc<dyn RemotePort>,
    gallery: GalleryManager,
}

impl SyncCoordinator {
    /// Load the local collection and start the owner thread.
    ///
    /// # Errors
    ///
    /// `SeedUnavailable` when there is neither a readable local collection
    /// nor a usable seed.
    pub fn open(store: LocalStore, remote: Arc<dyn RemotePort>, cache: ImageCache) -> Result<Self> {
        let records = store.load_memories()?;
        info!(records = records.len(), dir = %store.dir().display(), "local store loaded");
        let gallery = GalleryManager::new(Arc::clone(&remote), cache, store.images_dir());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands, snapshot) = Owner::spawn(store, records, events.clone())?;
        Ok(Self {
            commands,
            snapshot,
            events,
            remote,
            gallery,
        })
    }

    pub fn gallery(&self) -> &GalleryManager {
        &self.gallery
    }

    /// The current sorted list.
    pub fn snapshot(&self) -> Vec<MemoryRecord> {
        self.snapshot.borrow().as_ref().clone()
    }

    pub fn get(&self, id: MemoryId) -> Option<MemoryRecord> {
        self.snapshot.borrow().iter().find(|r| r.id == id).cloned()
    }

    /// Receiver that always holds the latest sorted list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<MemoryRecord>>> {
        self.snapshot.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // --- load ---

    /// Return the local list now and merge the remote set in the background.
    ///
    /// Remote wins on an id collision. Must be called inside a tokio runtime.
    pub fn load_all(&self) -> LoadAll {
        let local = self.snapshot();
        let this = self.clone();
        let span = start_sync_span("load", None);
        let merge = tokio::spawn(
            async move {
                let started = Instant::now();
                let result = this.fetch_and_merge().await;
                let outcome = if result.is_ok() { "synced" } else { "error" };
                record_remote_outcome(&tracing::Span::current(), outcome);
                record_metrics("load", outcome, started);
                result
            }
            .instrument(span),
        );
        LoadAll { local, merge }
    }

    async fn fetch_and_merge(&self) -> Result<Vec<MemoryRecord>> {
        let documents = self.remote.list_documents().await.inspect_err(|e| {
            warn!(error = %e, "remote fetch failed, keeping local records");
        })?;
        let remote = decode_documents(documents);
        self.request(|reply| Command::Merge { remote, reply }).await?
    }

    // --- add ---

    /// Create a record from `draft` with `images` as its gallery.
    ///
    /// The first image also becomes the local profile backup. If any upload
    /// or the document create fails, the record is kept LocalOnly with its
    /// images on local disk.
    ///
    /// # Errors
    ///
    /// `PartialFailure` when the record was kept LocalOnly but some of its
    /// images could not be written locally. The record is stored with the
    /// images that were.
    pub async fn add(&self, draft: MemoryDraft, images: Vec<Vec<u8>>) -> Result<MemoryRecord> {
        let id = self.request(|reply| Command::ReserveId { reply }).await?;
        let span = start_sync_span("add", Some(id));
        async {
            let started = Instant::now();
            let mut record = draft.into_record(id);
            if let Some(first) = images.first() {
                match self.gallery.save_local(first).await {
                    Ok(path) => record.profile_backup = Some(path),
                    Err(e) => warn!(error = %e, "could not write profile backup"),
                }
            }

            let mut unwritten = None;
            let outcome = match self.create_remote(&record, &images).await {
                Ok((remote_id, gallery)) => {
                    record.remote_id = Some(remote_id);
                    record.origin = Origin::Remote;
                    record.gallery = gallery;
                    RemoteOutcome::Synced
                }
                Err(e) => {
                    let appended = self.local_gallery(record.profile_backup.as_deref(), images).await;
                    if !appended.is_complete() {
                        unwritten = Some(Error::PartialFailure {
                            completed: appended.collection.len(),
                            failed: appended.failed.len(),
                        });
                    }
                    record.gallery = appended.collection;
                    self.discrepancy(id, "add", &e).await;
                    RemoteOutcome::Failed(e)
                }
            };

            let synced = outcome.is_synced();
            let record = self
                .request(|reply| Command::Insert {
                    record,
                    synced,
                    reply,
                })
                .await??;
            record_remote_outcome(&tracing::Span::current(), outcome.label());
            record_metrics("add", outcome.label(), started);
            info!(name = %record.name, origin = %record.origin, images = record.gallery.len(), "record added");
            match unwritten {
                Some(e) => Err(e),
                None => Ok(record),
            }
        }
        .instrument(span)
        .await
    }

    async fn create_remote(
        &self,
        record: &MemoryRecord,
        images: &[Vec<u8>],
    ) -> Result<(String, ImageCollection)> {
        let gallery = self.gallery.upload_all(record.id, images).await?;
        let mut document = MemoryDocument::from_record(record);
        document.image_urls = gallery.remote_urls();
        match self.remote.create_document(document.to_fields()?).await {
            Ok(remote_id) => Ok((remote_id, gallery)),
            Err(e) => {
                self.gallery.delete_blobs(&gallery.remote_urls()).await;
                Err(e)
            }
        }
    }

    /// Gallery for a record whose upload failed. The profile backup, when
    /// present, doubles as the first entry.
    async fn local_gallery(&self, backup: Option<&Path>, images: Vec<Vec<u8>>) -> Appended {
        let mut gallery = ImageCollection::new();
        let mut rest = images.into_iter();
        if let Some(path) = backup {
            gallery.push(ImageRef::local(path));
            rest.next();
        }
        self.gallery.append_local(&gallery, rest.collect()).await
    }

    // --- update ---

    /// Store `record`, appending `new_images` to its gallery.
    ///
    /// Synced records push the new document; on failure the local copy is
    /// still updated and the failure is returned in the outcome. A Remote
    /// record without a remote id is rejected before any I/O.
    ///
    /// Swapping the profile image drops a backup that still points at the
    /// old one, and its file is removed.
    pub async fn update(&self, record: MemoryRecord, new_images: Vec<Vec<u8>>) -> Result<UpdateOutcome> {
        let id = record.id;
        if record.origin == Origin::Remote && record.remote_id.is_none() {
            return Err(Error::InvalidOperation(format!(
                "record {id} is remote but has no remote id"
            )));
        }
        let Some(previous) = self.get(id) else {
            return Err(Error::NotFound(format!("record {id}")));
        };

        let span = start_sync_span("update", Some(id));
        async {
            let started = Instant::now();
            let mut record = record;
            let remote_id = record.remote_id.clone().filter(|_| record.origin == Origin::Remote);

            let appended = match remote_id {
                Some(_) => self.gallery.append(id, &record.gallery, new_images).await,
                None => self.gallery.append_local(&record.gallery, new_images).await,
            };
            record.gallery = appended.collection;
            let failed_uploads = appended.failed;

            let remote = match remote_id {
                Some(remote_id) => self.push_update(&record, &remote_id).await,
                None => RemoteOutcome::LocalOnly,
            };
            if let Some(e) = remote.error() {
                self.discrepancy(id, "update", e).await;
            }

            let synced = remote.is_synced();
            let record = self
                .request(|reply| Command::Replace {
                    record,
                    synced,
                    reply,
                })
                .await??
                .ok_or_else(|| Error::NotFound(format!("record {id}")))?;
            if let Some(stale) = previous.profile_backup.as_deref() {
                let referenced = record.profile_backup.as_deref() == Some(stale)
                    || record.gallery.iter().any(|image| image.path() == Some(stale));
                if !referenced {
                    self.gallery.delete_local_files([stale]).await;
                }
            }
            record_remote_outcome(&tracing::Span::current(), remote.label());
            record_metrics("update", remote.label(), started);
            Ok(UpdateOutcome {
                record,
                remote,
                failed_uploads,
            })
        }
        .instrument(span)
        .await
    }

    async fn push_update(&self, record: &MemoryRecord, remote_id: &str) -> RemoteOutcome {
        let fields = match MemoryDocument::from_record(record).to_fields() {
            Ok(fields) => fields,
            Err(e) => return RemoteOutcome::Failed(e),
        };
        match self.remote.update_document(remote_id, fields).await {
            Ok(()) => RemoteOutcome::Synced,
            Err(e) => RemoteOutcome::Failed(e),
        }
    }

    // --- delete ---

    /// Delete `record` remotely if it has a counterpart, then locally.
    ///
    /// The local removal happens whatever the remote outcome is.
    pub async fn delete(&self, record: &MemoryRecord) -> Result<RemoteOutcome> {
        let id = record.id;
        let span = start_sync_span("delete", Some(id));
        async {
            let started = Instant::now();
            let remote = match (&record.remote_id, record.origin) {
                (Some(remote_id), _) => self.delete_document(remote_id, &record.gallery.remote_urls()).await,
                (None, Origin::Remote) => self.delete_by_query(id).await,
                (None, Origin::LocalOnly) => RemoteOutcome::LocalOnly,
            };
            if let Some(e) = remote.error() {
                self.discrepancy(id, "delete", e).await;
            }

            let local_files = record
                .gallery
                .iter()
                .filter_map(ImageRef::path)
                .chain(record.profile_backup.as_deref());
            self.gallery.delete_local_files(local_files).await;

            let remote_deleted = remote.is_synced();
            let removed = self
                .request(|reply| Command::Remove {
                    id,
                    remote_deleted,
                    reply,
                })
                .await??;
            if removed.is_none() {
                debug!("record was not in the local list");
            }
            self.gallery.forget(id);
            record_remote_outcome(&tracing::Span::current(), remote.label());
            record_metrics("delete", remote.label(), started);
            Ok(remote)
        }
        .instrument(span)
        .await
    }

    /// Delete a document and the blobs it references.
    async fn delete_document(&self, remote_id: &str, urls: &[String]) -> RemoteOutcome {
        self.gallery.delete_blobs(urls).await;
        match self.remote.delete_document(remote_id).await {
            Ok(()) => RemoteOutcome::Synced,
            Err(e) => RemoteOutcome::Failed(e),
        }
    }

    /// Delete every document whose `id` field matches.
    async fn delete_by_query(&self, id: MemoryId) -> RemoteOutcome {
        let matches = match self.remote.query_by_field("id", &json!(id.0)).await {
            Ok(matches) => matches,
            Err(e) => return RemoteOutcome::Failed(e),
        };
        if matches.is_empty() {
            return RemoteOutcome::Failed(Error::NotFound(format!("no remote document with id {id}")));
        }

        let total = matches.len();
        let mut errors = Vec::new();
        for doc in matches {
            let urls = document_image_urls(&doc);
            if let RemoteOutcome::Failed(e) = self.delete_document(&doc.id, &urls).await {
                warn!(document = %doc.id, error = %e, "remote delete failed");
                errors.push(e);
            }
        }
        match errors.len() {
            0 => RemoteOutcome::Synced,
            n if n == total => RemoteOutcome::Failed(errors.remove(0)),
            n => RemoteOutcome::Failed(Error::PartialFailure {
                completed: total - n,
                failed: n,
            }),
        }
    }

    // --- profile ---

    pub async fn profile(&self) -> Result<Profile> {
        self.request(|reply| Command::LoadProfile { reply }).await?
    }

    pub async fn save_profile(&self, profile: Profile) -> Result<()> {
        self.request(|reply| Command::SaveProfile { profile, reply })
            .await?
    }

    // --- plumbing ---

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| owner_gone())?;
        rx.await.map_err(|_| owner_gone())
    }

    async fn discrepancy(&self, id: MemoryId, operation: &'static str, error: &Error) {
        let transient = error.is_transient();
        warn!(record_id = %id, operation, transient, error = %error, "sync discrepancy, local copy kept");
        metrics::sync_discrepancies().add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("error.kind", error.kind()),
            ],
        );
        let command = Command::Discrepancy {
            id,
            operation,
            error: error.to_string(),
            transient,
        };
        if self.commands.send(command).await.is_err() {
            debug!("owner gone, discrepancy not recorded");
        }
    }
}

fn owner_gone() -> Error {
    Error::Other("record owner thread has stopped".into())
}

fn record_metrics(operation: &'static str, result: &'static str, started: Instant) {
    metrics::sync_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
}

/// Decode remote documents, skipping any that do not parse.
fn decode_documents(documents: Vec<RemoteDocument>) -> Vec<MemoryRecord> {
    documents
        .into_iter()
        .filter_map(|doc| {
            let doc_id = doc.id.clone();
            MemoryRecord::try_from(doc)
                .inspect_err(|e| warn!(document = %doc_id, error = %e, "skipping malformed remote document"))
                .ok()
        })
        .collect()
}

/// Image URLs referenced by a raw document, tolerating odd shapes.
fn document_image_urls(doc: &RemoteDocument) -> Vec<String> {
    doc.fields
        .get("imageURLs")
        .and_then(|v| v.as_array())
        .map(|urls| {
            urls.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
