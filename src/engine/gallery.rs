//! Gallery manager: ordered image collections and fetch-through-cache.
//!
//! Every change to an [`ImageCollection`] goes through here, which keeps
//! the profile slot fixed at index 0 and growth append-only. Fetching runs
//! one tokio task per entry; results carry their original index and are
//! sorted before they reach the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use opentelemetry::KeyValue;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::error::{Error, Result};
use crate::model::{ImageCollection, ImageRef, MemoryId};
use crate::remote::{RemotePort, blob_path};
use crate::telemetry::metrics;

/// Where a resolved image's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// A pending local file.
    Local,
    /// The record's device copy of its profile image.
    Backup,
    Cache,
    Network,
}

impl ImageSource {
    fn as_str(self) -> &'static str {
        match self {
            ImageSource::Local => "local",
            ImageSource::Backup => "backup",
            ImageSource::Cache => "cache",
            ImageSource::Network => "network",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub index: usize,
    pub image: ImageRef,
    pub bytes: Vec<u8>,
    pub source: ImageSource,
}

#[derive(Debug)]
pub struct FailedImage {
    pub index: usize,
    pub image: ImageRef,
    pub error: Error,
}

/// Result of [`GalleryManager::resolve`]. Both lists are in index order.
#[derive(Debug, Default)]
pub struct Resolved {
    pub images: Vec<ResolvedImage>,
    pub failed: Vec<FailedImage>,
}

impl Resolved {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One image from an upload batch that did not make it.
#[derive(Debug)]
pub struct FailedUpload {
    /// Position in the submitted batch.
    pub batch_index: usize,
    pub error: Error,
}

/// Result of [`GalleryManager::append`].
#[derive(Debug)]
pub struct Appended {
    /// The input collection plus every image that was stored.
    pub collection: ImageCollection,
    pub uploaded: usize,
    pub failed: Vec<FailedUpload>,
}

impl Appended {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Collapse to the new collection, or `PartialFailure` if anything failed.
    pub fn into_result(self) -> Result<ImageCollection> {
        if self.failed.is_empty() {
            return Ok(self.collection);
        }
        Err(Error::PartialFailure {
            completed: self.uploaded,
            failed: self.failed.len(),
        })
    }
}

/// Owns the ordering rules for every record's gallery.
///
/// Cheap to clone; clones share the cache, the remote and the table of
/// in-flight fetch tags.
#[derive(Clone)]
pub struct GalleryManager {
    remote: Arc<dyn RemotePort>,
    cache: ImageCache,
    images_dir: PathBuf,
    latest: Arc<Mutex<FetchTags>>,
}

/// Latest URL set requested per record. Older batches compare against it.
///
/// An entry lives while its most recent batch is in flight.
#[derive(Default)]
struct FetchTags {
    generation: u64,
    by_record: HashMap<MemoryId, FetchTag>,
}

struct FetchTag {
    generation: u64,
    images: Vec<ImageRef>,
}

impl GalleryManager {
    pub fn new(remote: Arc<dyn RemotePort>, cache: ImageCache, images_dir: PathBuf) -> Self {
        Self {
            remote,
            cache,
            images_dir,
            latest: Arc::new(Mutex::new(FetchTags::default())),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    // --- fetch ---

    /// Fetch every image in `collection`, in collection order.
    ///
    /// `backup` is the record's device copy of its profile image. When set
    /// and readable it is used for a remote profile slot instead of the
    /// cache or network. Per-image failures are collected, not raised.
    pub async fn resolve(
        &self,
        collection: &ImageCollection,
        backup: Option<&Path>,
    ) -> Result<Resolved> {
        let mut tasks = JoinSet::new();
        for (index, image) in collection.iter().enumerate() {
            let this = self.clone();
            let image = image.clone();
            let backup = backup.filter(|_| index == 0).map(Path::to_path_buf);
            tasks.spawn(async move {
                let fetched = match backup {
                    Some(path) => this.fetch_profile(&image, &path).await,
                    None => this.fetch(&image).await,
                };
                (index, image, fetched)
            });
        }

        let mut resolved = Resolved::default();
        while let Some(joined) = tasks.join_next().await {
            let (index, image, fetched) =
                joined.map_err(|e| Error::Other(format!("gallery fetch task failed: {e}")))?;
            match fetched {
                Ok((bytes, source)) => {
                    metrics::gallery_fetches().add(1, &[KeyValue::new("source", source.as_str())]);
                    resolved.images.push(ResolvedImage {
                        index,
                        image,
                        bytes,
                        source,
                    });
                }
                Err(error) => {
                    metrics::gallery_fetches().add(1, &[KeyValue::new("source", "failed")]);
                    warn!(index, error = %error, "gallery image unavailable");
                    resolved.failed.push(FailedImage {
                        index,
                        image,
                        error,
                    });
                }
            }
        }
        resolved.images.sort_by_key(|r| r.index);
        resolved.failed.sort_by_key(|f| f.index);
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve) for a record's gallery, discarding stale
    /// results.
    ///
    /// Returns `None` when a later call for the same record asked for a
    /// different URL set before this one finished.
    pub async fn resolve_latest(
        &self,
        record_id: MemoryId,
        collection: &ImageCollection,
        backup: Option<&Path>,
    ) -> Result<Option<Resolved>> {
        let images = collection.as_slice().to_vec();
        let generation = {
            let mut tags = self.latest();
            tags.generation += 1;
            let generation = tags.generation;
            tags.by_record.insert(
                record_id,
                FetchTag {
                    generation,
                    images: images.clone(),
                },
            );
            generation
        };

        let resolved = self.resolve(collection, backup).await;

        let mut tags = self.latest();
        let current = match tags.by_record.get(&record_id) {
            Some(tag) if tag.images == images => Some(tag.generation),
            _ => None,
        };
        if current == Some(generation) {
            tags.by_record.remove(&record_id);
        }
        drop(tags);

        let resolved = resolved?;
        if current.is_none() {
            debug!(record_id = %record_id, "discarding superseded gallery fetch");
            return Ok(None);
        }
        Ok(Some(resolved))
    }

    /// Drop the fetch tag for a record that no longer exists.
    pub fn forget(&self, record_id: MemoryId) {
        self.latest().by_record.remove(&record_id);
    }

    fn latest(&self) -> MutexGuard<'_, FetchTags> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch_profile(&self, image: &ImageRef, backup: &Path) -> Result<(Vec<u8>, ImageSource)> {
        if let ImageRef::Remote { .. } = image {
            match tokio::fs::read(backup).await {
                Ok(bytes) => return Ok((bytes, ImageSource::Backup)),
                Err(e) => debug!(path = %backup.display(), error = %e, "profile backup unreadable"),
            }
        }
        self.fetch(image).await
    }

    async fn fetch(&self, image: &ImageRef) -> Result<(Vec<u8>, ImageSource)> {
        match image {
            ImageRef::LocalPending { path } => {
                let bytes = tokio::fs::read(path).await?;
                Ok((bytes, ImageSource::Local))
            }
            ImageRef::Remote { url } => {
                if let Some(bytes) = self.cache.get(url).await? {
                    return Ok((bytes, ImageSource::Cache));
                }
                let bytes = self.remote.download(url).await?;
                if let Err(e) = self.cache.put(url, &bytes).await {
                    warn!(url = %url, error = %e, "cache write failed");
                }
                Ok((bytes, ImageSource::Network))
            }
        }
    }

    // --- growth ---

    /// Upload `images` in order and append the resulting refs.
    ///
    /// Stops at the first failed upload. Everything uploaded before it is
    /// kept; it and the rest of the batch are reported in `failed`.
    pub async fn append(
        &self,
        record_id: MemoryId,
        collection: &ImageCollection,
        images: Vec<Vec<u8>>,
    ) -> Appended {
        let mut collection = collection.clone();
        let mut uploaded = 0;
        let mut failed = Vec::new();
        let mut batch = images.into_iter().enumerate();

        while let Some((batch_index, bytes)) = batch.next() {
            let path = blob_path(record_id, collection.len());
            match self.remote.upload(&path, bytes.clone()).await {
                Ok(url) => {
                    self.cache_uploaded(&url, &bytes).await;
                    collection.push(ImageRef::remote(url));
                    uploaded += 1;
                }
                Err(error) => {
                    warn!(record_id = %record_id, batch_index, error = %error, "upload failed");
                    failed.push(FailedUpload { batch_index, error });
                    failed.extend(batch.by_ref().map(|(batch_index, _)| FailedUpload {
                        batch_index,
                        error: Error::RemoteUnavailable("skipped after an earlier upload failed".into()),
                    }));
                }
            }
        }

        if !failed.is_empty() {
            info!(
                record_id = %record_id,
                failed = failed.len(),
                size = collection.len(),
                "gallery append incomplete"
            );
        }
        Appended {
            collection,
            uploaded,
            failed,
        }
    }

    /// Upload a whole gallery for a new record. All or nothing.
    ///
    /// Uploads run concurrently; the result keeps submission order. If any
    /// upload fails, the ones that succeeded are deleted again.
    pub async fn upload_all(&self, record_id: MemoryId, images: &[Vec<u8>]) -> Result<ImageCollection> {
        let uploads = images.iter().enumerate().map(|(index, bytes)| {
            let remote = Arc::clone(&self.remote);
            let path = blob_path(record_id, index);
            let bytes = bytes.clone();
            async move { remote.upload(&path, bytes).await }
        });
        let results = join_all(uploads).await;

        let mut urls = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(url) => urls.push(url),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => debug!(record_id = %record_id, error = %e, "further upload failure"),
            }
        }
        if let Some(error) = first_error {
            self.delete_blobs(&urls).await;
            return Err(error);
        }

        for (url, bytes) in urls.iter().zip(images) {
            self.cache_uploaded(url, bytes).await;
        }
        Ok(urls.into_iter().map(ImageRef::remote).collect())
    }

    /// Write `images` to the local images directory and append them as
    /// pending refs.
    ///
    /// Same contract as [`append`](Self::append): the first failed write
    /// ends the batch and everything stored before it is kept.
    pub async fn append_local(&self, collection: &ImageCollection, images: Vec<Vec<u8>>) -> Appended {
        let mut collection = collection.clone();
        let mut uploaded = 0;
        let mut failed = Vec::new();
        let mut batch = images.into_iter().enumerate();

        while let Some((batch_index, bytes)) = batch.next() {
            match self.save_local(&bytes).await {
                Ok(path) => {
                    collection.push(ImageRef::local(path));
                    uploaded += 1;
                }
                Err(error) => {
                    warn!(batch_index, dir = %self.images_dir.display(), error = %error, "local image write failed");
                    failed.push(FailedUpload { batch_index, error });
                    failed.extend(batch.by_ref().map(|(batch_index, _)| FailedUpload {
                        batch_index,
                        error: Error::Other("skipped after an earlier write failed".into()),
                    }));
                }
            }
        }
        Appended {
            collection,
            uploaded,
            failed,
        }
    }

    /// Store one image in the local images directory. Returns its path.
    pub async fn save_local(&self, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.images_dir).await?;
        let path = self
            .images_dir
            .join(format!("{}.jpg", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn cache_uploaded(&self, url: &str, bytes: &[u8]) {
        if let Err(e) = self.cache.put(url, bytes).await {
            debug!(url, error = %e, "could not cache uploaded image");
        }
    }

    // --- removal and replacement ---

    /// Remove the entry at `index`, closing the gap.
    ///
    /// The profile slot cannot be removed, and `index` must be in range;
    /// both are checked before any I/O. The blob delete is best-effort.
    pub async fn remove_at(&self, collection: &ImageCollection, index: usize) -> Result<ImageCollection> {
        if index == 0 {
            return Err(Error::InvalidOperation(
                "the profile image can be replaced but not removed".into(),
            ));
        }
        if index >= collection.len() {
            return Err(Error::InvalidOperation(format!(
                "index {index} out of range for a gallery of {}",
                collection.len()
            )));
        }

        let mut next = collection.clone();
        let removed = next.remove(index);
        self.discard(&removed).await;
        Ok(next)
    }

    /// Upload `bytes` and put it in the profile slot in place.
    ///
    /// The previous profile blob is deleted best-effort once the new one is
    /// stored. An upload failure leaves the collection untouched.
    pub async fn replace_profile(
        &self,
        record_id: MemoryId,
        collection: &ImageCollection,
        bytes: Vec<u8>,
    ) -> Result<ImageCollection> {
        let url = self.remote.upload(&blob_path(record_id, 0), bytes.clone()).await?;
        self.cache_uploaded(&url, &bytes).await;

        let mut next = collection.clone();
        if let Some(previous) = next.set_profile(ImageRef::remote(url)) {
            self.discard(&previous).await;
        }
        Ok(next)
    }

    /// [`replace_profile`](Self::replace_profile) for records that are not
    /// synced: the new image is stored locally.
    pub async fn replace_profile_local(
        &self,
        collection: &ImageCollection,
        bytes: &[u8],
    ) -> Result<ImageCollection> {
        let path = self.save_local(bytes).await?;
        let mut next = collection.clone();
        if let Some(previous) = next.set_profile(ImageRef::local(path)) {
            self.discard(&previous).await;
        }
        Ok(next)
    }

    /// Delete remote blobs best-effort. Returns how many deletes failed.
    pub async fn delete_blobs(&self, urls: &[String]) -> usize {
        let mut failures = 0;
        for url in urls {
            if let Err(e) = self.remote.delete_blob(url).await {
                warn!(url = %url, error = %e, "blob delete failed, blob orphaned");
                failures += 1;
            }
            self.evict(url).await;
        }
        failures
    }

    /// Remove local files this manager owns. Paths outside the images
    /// directory are left alone.
    pub async fn delete_local_files<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) {
        for path in paths {
            if !path.starts_with(&self.images_dir) {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "local image not removed");
            }
        }
    }

    async fn discard(&self, image: &ImageRef) {
        match image {
            ImageRef::Remote { url } => {
                self.delete_blobs(std::slice::from_ref(url)).await;
            }
            ImageRef::LocalPending { path } => {
                self.delete_local_files([path.as_path()]).await;
            }
        }
    }

    async fn evict(&self, url: &str) {
        if let Err(e) = self.cache.evict(url).await {
            debug!(url, error = %e, "cache evict failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryRemote;

    #[tokio::test]
    async fn fetch_tags_are_released() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let url = remote.insert_blob("memories/1/image_0_ab.jpg", b"a".to_vec());
        let cache = ImageCache::open(tmp.path().join("cache")).unwrap();
        let gallery = GalleryManager::new(remote, cache, tmp.path().join("images"));
        let collection = ImageCollection::from(vec![ImageRef::remote(url)]);

        let resolved = gallery
            .resolve_latest(MemoryId(1), &collection, None)
            .await
            .unwrap();
        assert!(resolved.is_some());
        assert!(gallery.latest().by_record.is_empty());

        gallery.latest().by_record.insert(
            MemoryId(2),
            FetchTag {
                generation: 7,
                images: Vec::new(),
            },
        );
        gallery.forget(MemoryId(2));
        assert!(gallery.latest().by_record.is_empty());
    }
}
