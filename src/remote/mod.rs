//! Remote document and blob store interface.
//!
//! The engine depends only on [`RemotePort`]. Implementations report
//! transport failures as [`Error::RemoteUnavailable`] and absent documents
//! or blobs as [`Error::NotFound`]; the coordinator's fallback policy keys
//! off that distinction.
//!
//! [`Error::RemoteUnavailable`]: crate::error::Error::RemoteUnavailable
//! [`Error::NotFound`]: crate::error::Error::NotFound

pub mod dir;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::MemoryId;
pub use crate::model::{DocumentFields, RemoteDocument};

/// Field names the store stamps on every write.
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

#[async_trait]
pub trait RemotePort: Send + Sync {
    // --- documents ---

    /// Create a document. Returns the server-assigned id.
    async fn create_document(&self, fields: DocumentFields) -> Result<String>;

    /// Merge `fields` into an existing document.
    async fn update_document(&self, id: &str, fields: DocumentFields) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentFields>>;

    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Documents whose `name` field equals `value`.
    async fn query_by_field(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<RemoteDocument>>;

    /// The full document set.
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>>;

    // --- blobs ---

    /// Store bytes at `path`. Returns the download URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    async fn delete_blob(&self, url: &str) -> Result<()>;
}

/// Blob path for a gallery slot.
///
/// The slot index keeps paths readable; the nonce keeps a slot reused
/// after a removal from overwriting a blob another entry still points at.
pub fn blob_path(record: MemoryId, index: usize) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("memories/{record}/image_{index}_{}.jpg", &nonce[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_paths_are_scoped_by_record_and_slot() {
        let p = blob_path(MemoryId(7), 3);
        assert!(p.starts_with("memories/7/image_3_"));
        assert!(p.ends_with(".jpg"));
        assert_ne!(p, blob_path(MemoryId(7), 3));
    }
}
