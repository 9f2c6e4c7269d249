//! Sync engine: record lifecycle and gallery management.

pub mod gallery;
mod owner;
pub mod sync;

pub use gallery::{
    Appended, FailedImage, FailedUpload, GalleryManager, ImageSource, Resolved, ResolvedImage,
};
pub use sync::{LoadAll, RemoteOutcome, SyncCoordinator, UpdateOutcome};
