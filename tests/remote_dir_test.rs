//! Integration tests for the directory-backed remote, including a full
//! coordinator round trip over it.

use std::sync::Arc;

use memories_sync::cache::ImageCache;
use memories_sync::engine::SyncCoordinator;
use memories_sync::error::Error;
use memories_sync::model::*;
use memories_sync::remote::dir::DirRemote;
use memories_sync::remote::{CREATED_AT_FIELD, RemotePort, UPDATED_AT_FIELD};
use memories_sync::storage::{LocalStore, Seed};
use serde_json::json;
use tempfile::TempDir;

fn fields(value: serde_json::Value) -> DocumentFields {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn documents_round_trip_with_server_timestamps() {
    let tmp = TempDir::new().unwrap();
    let remote = DirRemote::open(tmp.path()).unwrap();

    let id = remote
        .create_document(fields(json!({"id": 1, "name": "Fjord"})))
        .await
        .unwrap();
    let doc = remote.get_document(&id).await.unwrap().unwrap();
    assert!(doc.contains_key(CREATED_AT_FIELD));
    assert!(!doc.contains_key(UPDATED_AT_FIELD));

    remote
        .update_document(&id, fields(json!({"name": "Geirangerfjord"})))
        .await
        .unwrap();
    let doc = remote.get_document(&id).await.unwrap().unwrap();
    assert_eq!(doc["name"], json!("Geirangerfjord"));
    assert_eq!(doc["id"], json!(1));
    assert!(doc.contains_key(UPDATED_AT_FIELD));
}

#[tokio::test]
async fn query_matches_on_field_value() {
    let tmp = TempDir::new().unwrap();
    let remote = DirRemote::open(tmp.path()).unwrap();
    remote.create_document(fields(json!({"id": 7, "name": "a"}))).await.unwrap();
    remote.create_document(fields(json!({"id": 8, "name": "b"}))).await.unwrap();

    let hits = remote.query_by_field("id", &json!(7)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].fields["name"], json!("a"));
    assert_eq!(remote.list_documents().await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_items_are_not_found() {
    let tmp = TempDir::new().unwrap();
    let remote = DirRemote::open(tmp.path()).unwrap();

    assert!(remote.get_document("abc").await.unwrap().is_none());
    assert!(matches!(
        remote.update_document("abc", DocumentFields::new()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(remote.delete_document("abc").await, Err(Error::NotFound(_))));
    assert!(matches!(
        remote.download("dir://memories/1/none.jpg").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn blob_paths_cannot_escape_the_root() {
    let tmp = TempDir::new().unwrap();
    let remote = DirRemote::open(tmp.path().join("remote")).unwrap();

    let result = remote.upload("../outside.jpg", b"x".to_vec()).await;
    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert!(!tmp.path().join("outside.jpg").exists());
}

#[tokio::test]
async fn blobs_upload_download_delete() {
    let tmp = TempDir::new().unwrap();
    let remote = DirRemote::open(tmp.path()).unwrap();

    let url = remote.upload("memories/2/image_0_x.jpg", b"jpeg".to_vec()).await.unwrap();
    assert_eq!(remote.download(&url).await.unwrap(), b"jpeg");

    remote.delete_blob(&url).await.unwrap();
    assert!(matches!(remote.download(&url).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn two_devices_converge_through_a_shared_directory() {
    let tmp = TempDir::new().unwrap();
    let shared: Arc<dyn RemotePort> = Arc::new(DirRemote::open(tmp.path().join("remote")).unwrap());
    let open = |name: &str| {
        let store = LocalStore::open(tmp.path().join(name))
            .unwrap()
            .with_seed(Seed::Inline("[]".into()));
        let cache = ImageCache::open(tmp.path().join(name).join("cache")).unwrap();
        SyncCoordinator::open(store, Arc::clone(&shared), cache).unwrap()
    };

    let laptop = open("laptop");
    let added = laptop
        .add(
            MemoryDraft::new("Banff", Category::Hiking).coordinates(51.17, -115.57),
            vec![b"p".to_vec(), b"q".to_vec()],
        )
        .await
        .unwrap();
    assert!(added.is_synced());

    let phone = open("phone");
    let merged = phone.load_all().merged().await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, added.id);
    assert_eq!(merged[0].gallery, added.gallery);

    let resolved = phone
        .gallery()
        .resolve(&merged[0].gallery, None)
        .await
        .unwrap();
    let bytes: Vec<&[u8]> = resolved.images.iter().map(|r| r.bytes.as_slice()).collect();
    assert_eq!(bytes, vec![&b"p"[..], &b"q"[..]]);

    phone.delete(&merged[0]).await.unwrap();
    assert!(shared.list_documents().await.unwrap().is_empty());
}
