//! Memory record and its persisted form.
//!
//! Persisted records decode through [`StoredRecord`], which accepts both
//! the current layout and older files written before remote sync existed
//! (`firestoreDocumentId`, `imageNames`, `userImagePaths`, `imagePath`,
//! `isFromFirebase`). Missing fields default instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{Category, Coordinates, ImageCollection, ImageRef, MemoryId, Origin};

/// A travel memory tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRecord")]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub name: String,
    pub country: String,
    pub state: String,
    pub description: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_date: Option<String>,
    pub is_favorite: bool,
    pub is_featured: bool,
    pub coordinates: Coordinates,
    pub gallery: ImageCollection,
    /// Server document id, once the record has been created remotely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub origin: Origin,
    /// Device copy of the profile image, preferred over the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_backup: Option<PathBuf>,
}

impl MemoryRecord {
    pub fn is_synced(&self) -> bool {
        self.origin == Origin::Remote && self.remote_id.is_some()
    }

    /// Lowercased name, the sort key for the record list.
    pub(crate) fn sort_key(&self) -> String {
        self.name.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Defaulting decoder
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: MemoryId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    visited_date: Option<String>,
    #[serde(default)]
    is_favorite: bool,
    #[serde(default)]
    is_featured: bool,
    #[serde(default)]
    coordinates: Coordinates,
    #[serde(default)]
    gallery: Option<ImageCollection>,
    #[serde(default, alias = "firestoreDocumentId")]
    remote_id: Option<String>,
    #[serde(default)]
    origin: Option<Origin>,
    #[serde(default)]
    profile_backup: Option<PathBuf>,

    // Layout before the typed gallery.
    #[serde(default)]
    is_from_firebase: Option<bool>,
    #[serde(default)]
    image_names: Option<Vec<String>>,
    #[serde(default)]
    user_image_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    image_path: Option<PathBuf>,
}

impl From<StoredRecord> for MemoryRecord {
    fn from(s: StoredRecord) -> Self {
        let origin = s.origin.unwrap_or(match (s.is_from_firebase, &s.remote_id) {
            (Some(true), _) => Origin::Remote,
            (Some(false), _) => Origin::LocalOnly,
            (None, Some(_)) => Origin::Remote,
            (None, None) => Origin::LocalOnly,
        });

        let gallery = match s.gallery {
            Some(gallery) => gallery,
            None if origin == Origin::Remote => s
                .image_names
                .unwrap_or_default()
                .into_iter()
                .map(ImageRef::remote)
                .collect(),
            None => {
                let mut refs: Vec<ImageRef> = Vec::new();
                if let Some(ref path) = s.image_path {
                    refs.push(ImageRef::local(path.clone()));
                }
                for path in s.user_image_paths.unwrap_or_default() {
                    if s.image_path.as_ref() != Some(&path) {
                        refs.push(ImageRef::local(path));
                    }
                }
                refs.into()
            }
        };

        Self {
            id: s.id,
            name: s.name,
            country: s.country,
            state: s.state,
            description: s.description,
            category: s.category,
            visited_date: s.visited_date,
            is_favorite: s.is_favorite,
            is_featured: s.is_featured,
            coordinates: s.coordinates,
            gallery,
            remote_id: s.remote_id,
            origin,
            profile_backup: s.profile_backup.or(s.image_path),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// Records flagged as featured, in list order.
pub fn featured(records: &[MemoryRecord]) -> Vec<&MemoryRecord> {
    records.iter().filter(|r| r.is_featured).collect()
}

/// Records grouped by category name.
pub fn by_category(records: &[MemoryRecord]) -> BTreeMap<String, Vec<&MemoryRecord>> {
    let mut groups: BTreeMap<String, Vec<&MemoryRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.category.as_str().to_string())
            .or_default()
            .push(record);
    }
    groups
}

/// Favorites first; otherwise the existing order is kept.
pub fn favorites_first(records: &[MemoryRecord]) -> Vec<&MemoryRecord> {
    let mut out: Vec<&MemoryRecord> = records.iter().collect();
    out.sort_by_key(|r| !r.is_favorite);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_record_defaults_optional_fields() {
        let r: MemoryRecord = serde_json::from_str(r#"{"id": 4, "name": "Kyoto"}"#).unwrap();
        assert_eq!(r.id, MemoryId(4));
        assert_eq!(r.origin, Origin::LocalOnly);
        assert!(r.remote_id.is_none());
        assert!(r.gallery.is_empty());
        assert_eq!(r.category, Category::Travel);
    }

    #[test]
    fn legacy_firebase_record_maps_to_remote_gallery() {
        let json = r#"{
            "id": 9,
            "name": "Bali",
            "category": "Beach & Island",
            "imageName": "",
            "firestoreDocumentId": "doc-9",
            "isFromFirebase": true,
            "imageNames": ["https://blob/a.jpg", "https://blob/b.jpg"]
        }"#;
        let r: MemoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.origin, Origin::Remote);
        assert_eq!(r.remote_id.as_deref(), Some("doc-9"));
        assert_eq!(r.gallery.remote_urls(), vec!["https://blob/a.jpg", "https://blob/b.jpg"]);
        assert_eq!(r.category, Category::BeachIsland);
    }

    #[test]
    fn legacy_local_record_maps_paths_to_pending_refs() {
        let json = r#"{
            "id": 2,
            "name": "Zion",
            "imagePath": "/docs/p.jpg",
            "userImagePaths": ["/docs/p.jpg", "/docs/q.jpg"]
        }"#;
        let r: MemoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.origin, Origin::LocalOnly);
        assert_eq!(r.gallery.len(), 2);
        assert_eq!(r.gallery.profile(), Some(&ImageRef::local("/docs/p.jpg")));
        assert_eq!(r.profile_backup, Some(PathBuf::from("/docs/p.jpg")));
    }

    #[test]
    fn unknown_category_is_preserved() {
        let r: MemoryRecord =
            serde_json::from_str(r#"{"id": 1, "name": "x", "category": "City Break"}"#).unwrap();
        assert_eq!(r.category, Category::Other("City Break".into()));
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["category"], "City Break");
    }

    #[test]
    fn favorites_first_is_stable() {
        let mk = |id, fav| MemoryRecord {
            is_favorite: fav,
            ..serde_json::from_value(serde_json::json!({"id": id, "name": "n"})).unwrap()
        };
        let records = vec![mk(1, false), mk(2, true), mk(3, false), mk(4, true)];
        let ids: Vec<i64> = favorites_first(&records).iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }
}
