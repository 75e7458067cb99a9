//! Migration configuration
//!
//! Every setting has a default matching the production LAT deployment, so a
//! config file only needs to name what differs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MigrationError, Result};

/// Complete migration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub database: DatabaseConfig,
    pub paths: PathConfig,
    pub checksum: ChecksumConfig,
}

/// Corpus-structure database snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding `versions`, `archiveobjects` and `corpusnodes`
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("corpusstructure.sqlite"),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Tree of freshly generated FOXML files
    pub fox_dir: PathBuf,
    /// Tree receiving FOXML files with versions added
    pub target_fox_dir: PathBuf,
    /// Root of the version archive on disk
    pub versions_root_dir: PathBuf,
    /// URL prefix under which the version archive is published
    pub versions_base_url: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            fox_dir: PathBuf::from("/app/flat/import/fox/"),
            target_fox_dir: PathBuf::from("/app/flat/import/fox_with_versions/"),
            versions_root_dir: PathBuf::from("/lat/corpora/version-archive/"),
            versions_base_url: "https://latserver.org/version-archive/".to_string(),
        }
    }
}

/// Where missing checksums come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Ask the storage server over ssh
    Remote,
    /// Hash the archived file on this machine
    Local,
}

/// Checksum retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    pub mode: ChecksumMode,
    /// Remote shell program
    pub ssh_command: String,
    pub storage_server: String,
    pub storage_user: String,
    /// Tool returning the filesystem's stored checksum
    pub command: String,
    /// Tool computing a checksum when the filesystem has none
    pub fallback_command: String,
    /// Attempts per remote call
    pub max_attempts: u32,
    /// Per-attempt limit; unset waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            mode: ChecksumMode::Remote,
            ssh_command: "ssh".to_string(),
            storage_server: "storagehost".to_string(),
            storage_user: "corpman".to_string(),
            command: "/opt/vsm/sbin/slssum".to_string(),
            fallback_command: "md5sum".to_string(),
            max_attempts: 1,
            timeout_secs: None,
        }
    }
}

impl ChecksumConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl MigrationConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(data).map_err(|e| MigrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MigrationError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.fox_dir == self.paths.target_fox_dir {
            return Err(MigrationError::Config(
                "fox_dir and target_fox_dir must differ".into(),
            ));
        }
        if self.paths.versions_base_url.is_empty() {
            return Err(MigrationError::Config("versions_base_url is empty".into()));
        }
        if self.checksum.max_attempts == 0 {
            return Err(MigrationError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
