//! Remote document shape.
//!
//! The remote store deals in loosely typed field maps. [`MemoryDocument`] is
//! the typed view of one; decoding defaults every field except `id` and
//! `name`, so documents written by older clients still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Coordinates, ImageRef, MemoryId, MemoryRecord, Origin};
use crate::error::{Error, Result};

/// Field map as stored by the remote document service.
pub type DocumentFields = serde_json::Map<String, serde_json::Value>;

/// A document returned by the remote store, with its server-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: DocumentFields,
}

/// Field set written for each memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    pub id: MemoryId,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(rename = "imageURLs", default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited_date: Option<String>,
    /// Server-assigned; never written by the client.
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned; never written by the client.
    #[serde(default, skip_serializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryDocument {
    /// Build the document for a record. Only uploaded images are carried.
    pub fn from_record(record: &MemoryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            country: record.country.clone(),
            state: record.state.clone(),
            description: record.description.clone(),
            is_favorite: record.is_favorite,
            is_featured: record.is_featured,
            category: record.category.clone(),
            latitude: record.coordinates.latitude,
            longitude: record.coordinates.longitude,
            image_urls: record.gallery.remote_urls(),
            visited_date: record.visited_date.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_fields(fields: DocumentFields) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(fields))?)
    }

    pub fn to_fields(&self) -> Result<DocumentFields> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Other(format!(
                "memory document serialized to non-object: {other}"
            ))),
        }
    }

    /// The authoritative record for this document.
    pub fn into_record(self, remote_id: impl Into<String>) -> MemoryRecord {
        MemoryRecord {
            id: self.id,
            name: self.name,
            country: self.country,
            state: self.state,
            description: self.description,
            category: self.category,
            visited_date: self.visited_date,
            is_favorite: self.is_favorite,
            is_featured: self.is_featured,
            coordinates: Coordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            gallery: self.image_urls.into_iter().map(ImageRef::remote).collect(),
            remote_id: Some(remote_id.into()),
            origin: Origin::Remote,
            profile_backup: None,
        }
    }
}

impl TryFrom<RemoteDocument> for MemoryRecord {
    type Error = Error;

    fn try_from(doc: RemoteDocument) -> Result<Self> {
        Ok(MemoryDocument::from_fields(doc.fields)?.into_record(doc.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_timestamps_are_read_but_not_written() {
        let fields = json!({
            "id": 3,
            "name": "Lisbon",
            "latitude": 38.7,
            "longitude": -9.1,
            "imageURLs": ["u0", "u1"],
            "createdAt": "2025-04-01T10:00:00Z"
        });
        let doc = MemoryDocument::from_fields(fields.as_object().unwrap().clone()).unwrap();
        assert!(doc.created_at.is_some());

        let out = doc.to_fields().unwrap();
        assert!(!out.contains_key("createdAt"));
        assert!(!out.contains_key("updatedAt"));
        assert_eq!(out["imageURLs"], json!(["u0", "u1"]));
    }

    #[test]
    fn document_without_name_is_rejected() {
        let fields = json!({"id": 3}).as_object().unwrap().clone();
        assert!(MemoryDocument::from_fields(fields).is_err());
    }

    #[test]
    fn into_record_marks_remote_origin() {
        let fields = json!({"id": 1, "name": "Bali Trip", "imageURLs": ["a"]});
        let record = MemoryRecord::try_from(RemoteDocument {
            id: "doc-1".into(),
            fields: fields.as_object().unwrap().clone(),
        })
        .unwrap();
        assert_eq!(record.origin, Origin::Remote);
        assert_eq!(record.remote_id.as_deref(), Some("doc-1"));
        assert_eq!(record.gallery.len(), 1);
    }
}
