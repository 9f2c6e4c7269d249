//! Integration tests for the local store.

use memories_sync::model::*;
use memories_sync::storage::{LocalStore, Seed};
use tempfile::TempDir;

#[test]
fn first_run_loads_bundled_seed() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();

    let records = store.load_memories().unwrap();
    assert!(records.iter().any(|r| r.name == "Turtle Rock"));
    assert!(store.images_dir().is_dir());
}

#[test]
fn saved_records_load_back_unchanged() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path())
        .unwrap()
        .with_seed(Seed::Inline("[]".into()));

    let mut record: MemoryRecord = serde_json::from_value(serde_json::json!({
        "id": 3,
        "name": "Sintra",
        "category": "Travel",
        "coordinates": {"latitude": 38.79, "longitude": -9.39}
    }))
    .unwrap();
    record.gallery = ImageCollection::from(vec![
        ImageRef::remote("dir://memories/3/image_0_aa.jpg"),
        ImageRef::local(tmp.path().join("images/b.jpg")),
    ]);
    record.remote_id = Some("doc-9".into());
    record.origin = Origin::Remote;

    store.save_memories(std::slice::from_ref(&record)).unwrap();

    assert_eq!(store.load_memories().unwrap(), vec![record]);
}

#[test]
fn local_file_wins_over_seed() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();
    store.save_memories(&[]).unwrap();

    assert!(store.load_memories().unwrap().is_empty());
}

#[test]
fn legacy_records_load_with_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("memories.json"),
        r#"[
            {"id": 1, "name": "Old Remote", "firestoreDocumentId": "abc",
             "isFromFirebase": true, "imageNames": ["https://x/0", "https://x/1"]},
            {"id": 2, "name": "Old Local", "imagePath": "/photos/p.jpg",
             "userImagePaths": ["/photos/p.jpg", "/photos/q.jpg"]}
        ]"#,
    )
    .unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();

    let records = store.load_memories().unwrap();

    assert_eq!(records[0].origin, Origin::Remote);
    assert_eq!(records[0].remote_id.as_deref(), Some("abc"));
    assert_eq!(records[0].gallery.remote_urls(), vec!["https://x/0", "https://x/1"]);

    assert_eq!(records[1].origin, Origin::LocalOnly);
    assert_eq!(records[1].gallery.len(), 2);
    assert_eq!(
        records[1].profile_backup.as_deref(),
        Some(std::path::Path::new("/photos/p.jpg"))
    );
}

#[test]
fn profile_defaults_then_round_trips() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();
    assert_eq!(store.load_profile().unwrap(), Profile::default());

    let profile = Profile {
        username: "nomad".into(),
        prefers_notifications: false,
        profile_image_file_name: Some("me.jpg".into()),
    };
    store.save_profile(&profile).unwrap();
    assert_eq!(store.load_profile().unwrap(), profile);
}

#[test]
fn corrupt_profile_yields_default() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("profile.json"), b"[]").unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();

    assert_eq!(store.load_profile().unwrap().username, "wayne113_");
}
