//! Configuration loading and validation for folio.
//!
//! Values come from three layers, later layers overriding earlier ones:
//! built-in defaults, an optional TOML file, and `FOLIO_`-prefixed
//! environment variables (`FOLIO_SCAN__CHUNK_SIZE=25`, with `__` between
//! section and key).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FOLIO_";
const CONFIG_FILE: &str = "folio.toml";
const CACHE_FILE: &str = "scan-cache.db";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cache: CacheSection,
    pub scan: ScanSection,
}

/// Scan cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Explicit path of the scan cache database. Defaults to the platform
    /// cache directory when unset.
    pub path: Option<PathBuf>,
    /// Maximum number of cached sources before LRU eviction kicks in.
    pub capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { path: None, capacity: 100 }
    }
}

/// Progressive enumeration settings; see `folio-ingest` for how each knob
/// is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    /// Upper bound on the image count returned synchronously from an open.
    pub initial_slice: usize,
    /// Number of images per background progress event.
    pub chunk_size: usize,
    /// Delay in milliseconds between background chunks.
    pub throttle_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            initial_slice: 100,
            chunk_size: 50,
            throttle_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from the default file location (if present) and
    /// the environment.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = project_dirs() {
            figment = figment.merge(Toml::file(dirs.config_dir().join(CONFIG_FILE)));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from an explicit TOML file plus the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            exn::bail!(ErrorKind::Invalid("cache.capacity"));
        }
        if self.scan.initial_slice == 0 {
            exn::bail!(ErrorKind::Invalid("scan.initial_slice"));
        }
        if self.scan.chunk_size == 0 {
            exn::bail!(ErrorKind::Invalid("scan.chunk_size"));
        }
        Ok(())
    }

    /// Where the scan cache database lives: the configured path, or the
    /// platform cache directory. `None` only when the platform provides no
    /// home directory at all.
    pub fn cache_location(&self) -> Option<PathBuf> {
        match &self.cache.path {
            Some(path) => Some(path.clone()),
            None => project_dirs().map(|dirs| dirs.cache_dir().join(CACHE_FILE)),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "folio")
}
