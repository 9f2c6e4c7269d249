//! Disk cache for fetched remote images.
//!
//! Entries are keyed by the SHA-256 of the remote URL and sharded by the
//! first two hex digits. Each key is written once and read many times;
//! the only invalidation is an explicit [`ImageCache::evict`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use opentelemetry::KeyValue;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::telemetry::metrics;

/// Image cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    /// Open or create a cache at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for a URL: lowercase hex SHA-256.
    pub fn key(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// On-disk location of the entry for `url`.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let key = Self::key(url);
        self.dir.join(&key[..2]).join(key)
    }

    /// Look up an entry. Never touches the network.
    pub async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(url)).await {
            Ok(bytes) => {
                metrics::cache_lookups().add(1, &[KeyValue::new("result", "hit")]);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                metrics::cache_lookups().add(1, &[KeyValue::new("result", "miss")]);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        tokio::fs::try_exists(self.path_for(url))
            .await
            .unwrap_or(false)
    }

    /// Store bytes for `url`. A key that already exists is left untouched.
    ///
    /// The bytes land in a unique temp file first and are renamed into
    /// place, so concurrent writers of the same key cannot tear an entry.
    pub async fn put(&self, url: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(url);
        if tokio::fs::try_exists(&path).await? {
            debug!(url, "cache entry exists, skipping write");
            return Ok(());
        }
        if let Some(shard) = path.parent() {
            tokio::fs::create_dir_all(shard).await?;
        }
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(url, size = bytes.len(), "cached image");
        Ok(())
    }

    /// Drop the entry for `url`. Returns whether one existed.
    pub async fn evict(&self, url: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_where_naive_sanitizing_collides() {
        // Replacing '/' and ':' with '_' maps both of these to "a_b_c".
        assert_ne!(ImageCache::key("a/b:c"), ImageCache::key("a_b_c"));
        assert_ne!(ImageCache::key("a:b/c"), ImageCache::key("a/b:c"));
    }

    #[test]
    fn key_is_deterministic_hex() {
        let k = ImageCache::key("https://blob.example/memories/1/image_0.jpg");
        assert_eq!(k.len(), 64);
        assert!(k.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(k, ImageCache::key("https://blob.example/memories/1/image_0.jpg"));
    }
}
