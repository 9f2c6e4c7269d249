//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup, fails fast if required settings are missing.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::Seed;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Holds `memories.json`, `profile.json` and local images.
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Root of a directory-backed remote. Unset means offline.
    pub remote_dir: Option<PathBuf>,
    /// Seed dataset override. Unset means the bundled one.
    pub seed_path: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(var("MEMORIES_DATA_DIR").ok_or_else(|| {
            Error::Config("required environment variable MEMORIES_DATA_DIR is not set".into())
        })?);
        Ok(Self {
            cache_dir: var("MEMORIES_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("cache")),
            remote_dir: var("MEMORIES_REMOTE_DIR").map(PathBuf::from),
            seed_path: var("MEMORIES_SEED_PATH").map(PathBuf::from),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            data_dir,
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// Relative paths in the file are taken relative to the file itself.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: ConfigFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(file.memories.resolve(base))
    }

    pub fn seed(&self) -> Seed {
        match &self.seed_path {
            Some(path) => Seed::File(path.clone()),
            None => Seed::Bundled,
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    memories: FileSettings,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    data_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    remote_dir: Option<PathBuf>,
    seed_path: Option<PathBuf>,
    otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FileSettings {
    fn resolve(self, base: &Path) -> Config {
        let data_dir = base.join(self.data_dir);
        Config {
            cache_dir: self
                .cache_dir
                .map(|p| base.join(p))
                .unwrap_or_else(|| data_dir.join("cache")),
            remote_dir: self.remote_dir.map(|p| base.join(p)),
            seed_path: self.seed_path.map(|p| base.join(p)),
            otel_endpoint: self.otel_endpoint,
            log_level: self.log_level,
            data_dir,
        }
    }
}
