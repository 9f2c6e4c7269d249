//! Directory-backed remote store.
//!
//! Documents live as `documents/<id>.json`, blobs under `blobs/<path>`.
//! Point it at a synced or shared folder to get a working remote without a
//! hosted service. Blob URLs use the `dir://` scheme and always resolve
//! inside the store root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::{CREATED_AT_FIELD, DocumentFields, RemoteDocument, RemotePort, UPDATED_AT_FIELD};
use crate::error::{Error, Result};

const URL_SCHEME: &str = "dir://";

pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    /// Open or create a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("documents"))?;
        std::fs::create_dir_all(root.join("blobs"))?;
        Ok(Self { root })
    }

    fn document_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::InvalidOperation(format!("bad document id: {id:?}")));
        }
        Ok(self.root.join("documents").join(format!("{id}.json")))
    }

    fn blob_file(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if path.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(Error::InvalidOperation(format!("bad blob path: {path:?}")));
        }
        Ok(self.root.join("blobs").join(rel))
    }

    fn blob_file_for_url(&self, url: &str) -> Result<PathBuf> {
        let path = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| Error::NotFound(format!("not a {URL_SCHEME} url: {url}")))?;
        self.blob_file(path)
    }

    async fn read_document(&self, id: &str) -> Result<Option<DocumentFields>> {
        let path = self.document_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("read document", e)),
        }
    }

    async fn write_document(&self, id: &str, fields: &DocumentFields) -> Result<()> {
        let path = self.document_path(id)?;
        let json = serde_json::to_vec_pretty(fields)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| unavailable("write document", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable("write document", e))
    }

    async fn all_documents(&self) -> Result<Vec<RemoteDocument>> {
        let mut entries = tokio::fs::read_dir(self.root.join("documents"))
            .await
            .map_err(|e| unavailable("list documents", e))?;
        let mut docs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable("list documents", e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match self.read_document(&id).await {
                Ok(Some(fields)) => docs.push(RemoteDocument { id, fields }),
                Ok(None) => {}
                Err(e) => warn!(document = %id, error = %e, "skipping unreadable document"),
            }
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }
}

fn unavailable(op: &str, e: std::io::Error) -> Error {
    Error::RemoteUnavailable(format!("{op}: {e}"))
}

#[async_trait]
impl RemotePort for DirRemote {
    async fn create_document(&self, mut fields: DocumentFields) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        fields.insert(CREATED_AT_FIELD.into(), Utc::now().to_rfc3339().into());
        self.write_document(&id, &fields).await?;
        debug!(document = %id, "document created");
        Ok(id)
    }

    async fn update_document(&self, id: &str, fields: DocumentFields) -> Result<()> {
        let mut doc = self
            .read_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        doc.extend(fields);
        doc.insert(UPDATED_AT_FIELD.into(), Utc::now().to_rfc3339().into());
        self.write_document(id, &doc).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentFields>> {
        self.read_document(id).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.document_path(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("document {id}")))
            }
            Err(e) => Err(unavailable("delete document", e)),
        }
    }

    async fn query_by_field(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<RemoteDocument>> {
        Ok(self
            .all_documents()
            .await?
            .into_iter()
            .filter(|doc| doc.fields.get(name) == Some(value))
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        self.all_documents().await
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let file = self.blob_file(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("upload", e))?;
        }
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| unavailable("upload", e))?;
        Ok(format!("{URL_SCHEME}{path}"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.blob_file_for_url(url)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!("blob {url}"))),
            Err(e) => Err(unavailable("download", e)),
        }
    }

    async fn delete_blob(&self, url: &str) -> Result<()> {
        match tokio::fs::remove_file(self.blob_file_for_url(url)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!("blob {url}"))),
            Err(e) => Err(unavailable("delete blob", e)),
        }
    }
}
