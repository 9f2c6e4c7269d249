//! In-process remote store (for testing and offline demos).
//!
//! Behaves like a real document/blob service, including server-stamped
//! timestamps, and lets tests inject faults: going offline, failing
//! uploads after a budget, failing document writes or blob deletes, and
//! delaying individual downloads to permute completion order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{CREATED_AT_FIELD, DocumentFields, RemoteDocument, RemotePort, UPDATED_AT_FIELD};
use crate::error::{Error, Result};

const URL_SCHEME: &str = "mem://";

#[derive(Default)]
struct State {
    next_doc: u64,
    documents: BTreeMap<String, DocumentFields>,
    blobs: HashMap<String, Vec<u8>>,
    calls: HashMap<&'static str, usize>,
    deleted_blobs: Vec<String>,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    upload_budget: Option<usize>,
    fail_document_writes: bool,
    fail_blob_deletes: bool,
    download_delays: HashMap<String, Duration>,
}

/// Remote store held entirely in memory.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and fail if the store is offline.
    fn enter(&self, op: &'static str) -> Result<()> {
        *self.state().calls.entry(op).or_default() += 1;
        if self.faults().offline {
            return Err(Error::RemoteUnavailable(format!("{op}: store offline")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    pub fn set_offline(&self, offline: bool) {
        self.faults().offline = offline;
    }

    /// Allow `n` more successful uploads, then fail every later one.
    pub fn fail_uploads_after(&self, n: usize) {
        self.faults().upload_budget = Some(n);
    }

    pub fn fail_document_writes(&self, fail: bool) {
        self.faults().fail_document_writes = fail;
    }

    pub fn fail_blob_deletes(&self, fail: bool) {
        self.faults().fail_blob_deletes = fail;
    }

    pub fn set_download_delay(&self, url: impl Into<String>, delay: Duration) {
        self.faults().download_delays.insert(url.into(), delay);
    }

    // -----------------------------------------------------------------------
    // Direct access
    // -----------------------------------------------------------------------

    /// Insert a document as if another client had written it.
    pub fn insert_document(&self, mut fields: DocumentFields) -> String {
        let mut state = self.state();
        state.next_doc += 1;
        let id = format!("doc-{:06}", state.next_doc);
        fields.insert(CREATED_AT_FIELD.into(), Utc::now().to_rfc3339().into());
        state.documents.insert(id.clone(), fields);
        id
    }

    /// Insert a blob as if another client had uploaded it. Returns its URL.
    pub fn insert_blob(&self, path: &str, bytes: Vec<u8>) -> String {
        let url = format!("{URL_SCHEME}{path}");
        self.state().blobs.insert(url.clone(), bytes);
        url
    }

    pub fn document(&self, id: &str) -> Option<DocumentFields> {
        self.state().documents.get(id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    pub fn has_blob(&self, url: &str) -> bool {
        self.state().blobs.contains_key(url)
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    /// URLs passed to `delete_blob`, in call order, successful or not.
    pub fn deleted_blobs(&self) -> Vec<String> {
        self.state().deleted_blobs.clone()
    }

    /// How many times the named port operation was called.
    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemotePort for MemoryRemote {
    async fn create_document(&self, mut fields: DocumentFields) -> Result<String> {
        self.enter("create_document")?;
        if self.faults().fail_document_writes {
            return Err(Error::RemoteUnavailable("create_document rejected".into()));
        }
        let mut state = self.state();
        state.next_doc += 1;
        let id = format!("doc-{:06}", state.next_doc);
        fields.insert(CREATED_AT_FIELD.into(), Utc::now().to_rfc3339().into());
        state.documents.insert(id.clone(), fields);
        Ok(id)
    }

    async fn update_document(&self, id: &str, fields: DocumentFields) -> Result<()> {
        self.enter("update_document")?;
        if self.faults().fail_document_writes {
            return Err(Error::RemoteUnavailable("update_document rejected".into()));
        }
        let mut state = self.state();
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        doc.extend(fields);
        doc.insert(UPDATED_AT_FIELD.into(), Utc::now().to_rfc3339().into());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentFields>> {
        self.enter("get_document")?;
        Ok(self.state().documents.get(id).cloned())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.enter("delete_document")?;
        if self.faults().fail_document_writes {
            return Err(Error::RemoteUnavailable("delete_document rejected".into()));
        }
        match self.state().documents.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("document {id}"))),
        }
    }

    async fn query_by_field(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<RemoteDocument>> {
        self.enter("query_by_field")?;
        Ok(self
            .state()
            .documents
            .iter()
            .filter(|(_, fields)| fields.get(name) == Some(value))
            .map(|(id, fields)| RemoteDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        self.enter("list_documents")?;
        Ok(self
            .state()
            .documents
            .iter()
            .map(|(id, fields)| RemoteDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.enter("upload")?;
        {
            let mut faults = self.faults();
            if let Some(budget) = faults.upload_budget.as_mut() {
                if *budget == 0 {
                    return Err(Error::RemoteUnavailable(format!("upload {path} rejected")));
                }
                *budget -= 1;
            }
        }
        let url = format!("{URL_SCHEME}{path}");
        self.state().blobs.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.enter("download")?;
        let delay = self.faults().download_delays.get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state()
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("blob {url}")))
    }

    async fn delete_blob(&self, url: &str) -> Result<()> {
        self.enter("delete_blob")?;
        self.state().deleted_blobs.push(url.to_string());
        if self.faults().fail_blob_deletes {
            return Err(Error::RemoteUnavailable(format!("delete {url} rejected")));
        }
        match self.state().blobs.remove(url) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("blob {url}"))),
        }
    }
}
