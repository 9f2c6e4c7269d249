//! Ordered image collection.
//!
//! Index 0 is the profile slot. Growth is append-only and removal closes
//! the gap. Mutators are crate-private: the gallery manager is the only
//! code path allowed to change a collection, so the ordering rules hold.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One gallery entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ImageRef {
    /// Uploaded blob, addressed by its download URL.
    Remote { url: String },
    /// Image on local disk not yet uploaded.
    LocalPending { path: PathBuf },
}

impl ImageRef {
    pub fn remote(url: impl Into<String>) -> Self {
        ImageRef::Remote { url: url.into() }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        ImageRef::LocalPending { path: path.into() }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ImageRef::Remote { url } => Some(url),
            ImageRef::LocalPending { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageRef::Remote { .. } => None,
            ImageRef::LocalPending { path } => Some(path),
        }
    }
}

/// Ordered sequence of image refs for one record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCollection(Vec<ImageRef>);

impl ImageCollection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRef> {
        self.0.get(index)
    }

    /// The profile slot, if any.
    pub fn profile(&self) -> Option<&ImageRef> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRef> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ImageRef] {
        &self.0
    }

    /// Remote URLs in gallery order. Local entries are skipped.
    pub fn remote_urls(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|r| r.url().map(str::to_string))
            .collect()
    }

    /// True when every entry has been uploaded.
    pub fn is_fully_remote(&self) -> bool {
        self.0.iter().all(|r| matches!(r, ImageRef::Remote { .. }))
    }

    pub(crate) fn push(&mut self, image: ImageRef) {
        self.0.push(image);
    }

    pub(crate) fn remove(&mut self, index: usize) -> ImageRef {
        self.0.remove(index)
    }

    /// Swap the profile slot in place, or fill it if the collection is empty.
    /// Returns the previous profile entry.
    pub(crate) fn set_profile(&mut self, image: ImageRef) -> Option<ImageRef> {
        match self.0.first_mut() {
            Some(slot) => Some(std::mem::replace(slot, image)),
            None => {
                self.0.push(image);
                None
            }
        }
    }
}

impl From<Vec<ImageRef>> for ImageCollection {
    fn from(refs: Vec<ImageRef>) -> Self {
        Self(refs)
    }
}

impl FromIterator<ImageRef> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = ImageRef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ImageCollection {
    type Item = &'a ImageRef;
    type IntoIter = std::slice::Iter<'a, ImageRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
