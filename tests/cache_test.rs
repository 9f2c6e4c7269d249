//! Integration tests for the image cache.

use memories_sync::cache::ImageCache;
use tempfile::TempDir;

const URL: &str = "https://blob.example/memories/4/image_0_ab12cd34.jpg";

#[tokio::test]
async fn get_on_empty_cache_is_none() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();

    assert!(cache.get(URL).await.unwrap().is_none());
    assert!(!cache.contains(URL).await);
}

#[tokio::test]
async fn put_then_get_returns_bytes() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();

    cache.put(URL, b"jpeg").await.unwrap();

    assert_eq!(cache.get(URL).await.unwrap().as_deref(), Some(&b"jpeg"[..]));
    assert!(cache.path_for(URL).starts_with(tmp.path()));
}

#[tokio::test]
async fn put_is_idempotent_and_write_once() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();

    cache.put(URL, b"first").await.unwrap();
    cache.put(URL, b"first").await.unwrap();
    cache.put(URL, b"second").await.unwrap();

    assert_eq!(cache.get(URL).await.unwrap().unwrap(), b"first");
}

#[tokio::test]
async fn concurrent_puts_leave_one_intact_entry() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();
    let bytes = vec![7u8; 64 * 1024];

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let bytes = bytes.clone();
        tasks.spawn(async move { cache.put(URL, &bytes).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(cache.get(URL).await.unwrap().unwrap(), bytes);
    let shard = cache.path_for(URL).parent().unwrap().to_path_buf();
    let files = std::fs::read_dir(shard).unwrap().count();
    assert_eq!(files, 1, "temp files left behind");
}

#[tokio::test]
async fn distinct_urls_do_not_collide() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();

    cache.put("a/b:c", b"one").await.unwrap();
    cache.put("a_b_c", b"two").await.unwrap();

    assert_eq!(cache.get("a/b:c").await.unwrap().unwrap(), b"one");
    assert_eq!(cache.get("a_b_c").await.unwrap().unwrap(), b"two");
}

#[tokio::test]
async fn evict_drops_entry() {
    let tmp = TempDir::new().unwrap();
    let cache = ImageCache::open(tmp.path()).unwrap();
    cache.put(URL, b"jpeg").await.unwrap();

    assert!(cache.evict(URL).await.unwrap());
    assert!(!cache.evict(URL).await.unwrap());
    assert!(cache.get(URL).await.unwrap().is_none());

    cache.put(URL, b"fresh").await.unwrap();
    assert_eq!(cache.get(URL).await.unwrap().unwrap(), b"fresh");
}

#[tokio::test]
async fn entries_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    ImageCache::open(tmp.path())
        .unwrap()
        .put(URL, b"jpeg")
        .await
        .unwrap();

    let reopened = ImageCache::open(tmp.path()).unwrap();
    assert!(reopened.contains(URL).await);
}
