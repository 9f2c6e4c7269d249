//! Local on-disk storage.
//!
//! Whole-collection persistence for memory records and the profile. Every
//! write replaces the file through a temp-file rename, so a crash never
//! leaves a half-written collection behind. All writes go through the
//! coordinator's owner thread.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{MemoryRecord, Profile};

const MEMORIES_FILE: &str = "memories.json";
const PROFILE_FILE: &str = "profile.json";
const IMAGES_DIR: &str = "images";

/// Dataset shipped with the binary for first-run bootstrap.
const BUNDLED_SEED: &str = include_str!("../data/seed.json");

/// Where first-run records come from when no local file exists.
#[derive(Debug, Clone)]
pub enum Seed {
    /// The dataset compiled into the crate.
    Bundled,
    /// A JSON file on disk.
    File(PathBuf),
    /// A JSON document held in memory.
    Inline(String),
}

/// Storage backend. Owns the data directory.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
    seed: Seed,
}

impl LocalStore {
    /// Open or create a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(IMAGES_DIR))?;
        Ok(Self {
            dir,
            seed: Seed::Bundled,
        })
    }

    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for images that only exist on this device.
    pub fn images_dir(&self) -> PathBuf {
        self.dir.join(IMAGES_DIR)
    }

    // -----------------------------------------------------------------------
    // Memories
    // -----------------------------------------------------------------------

    /// Load the record collection, falling back to the seed dataset when
    /// no readable local file exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeedUnavailable`] if the fallback fails too.
    pub fn load_memories(&self) -> Result<Vec<MemoryRecord>> {
        let path = self.dir.join(MEMORIES_FILE);
        if path.exists() {
            match fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
            {
                Ok(records) => return Ok(records),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "local memories unreadable, using seed");
                }
            }
        }
        self.load_seed()
    }

    /// Replace the persisted collection.
    pub fn save_memories(&self, records: &[MemoryRecord]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let path = self.dir.join(MEMORIES_FILE);
        write_atomic(&path, &json)?;
        debug!(count = records.len(), path = %path.display(), "memories saved");
        Ok(())
    }

    fn load_seed(&self) -> Result<Vec<MemoryRecord>> {
        let raw = match &self.seed {
            Seed::Bundled => BUNDLED_SEED.to_string(),
            Seed::Inline(json) => json.clone(),
            Seed::File(path) => fs::read_to_string(path).map_err(|e| {
                Error::SeedUnavailable(format!("cannot read {}: {e}", path.display()))
            })?,
        };
        let records: Vec<MemoryRecord> = serde_json::from_str(&raw)
            .map_err(|e| Error::SeedUnavailable(format!("seed dataset is malformed: {e}")))?;
        info!(count = records.len(), "loaded seed dataset");
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// Load the profile. Missing or unreadable files yield the default profile.
    pub fn load_profile(&self) -> Result<Profile> {
        let path = self.dir.join(PROFILE_FILE);
        if !path.exists() {
            return Ok(Profile::default());
        }
        let bytes = fs::read(&path)?;
        match serde_json::from_slice(&bytes) {
            Ok(profile) => Ok(profile),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "profile unreadable, using default");
                Ok(Profile::default())
            }
        }
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        let json = serde_json::to_vec_pretty(profile)?;
        write_atomic(&self.dir.join(PROFILE_FILE), &json)
    }
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Other(format!("bad target path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
