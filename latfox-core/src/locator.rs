//! Locating the FOXML file generated for an archived object

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{MigrationError, Result};
use crate::record::PersistentId;

/// Index of FOXML files in the source tree, keyed by file name.
///
/// The tree is walked once, in sorted order; when two directories hold a
/// file of the same name the first one wins.
pub struct FoxmlLocator {
    root: PathBuf,
    files: HashMap<String, PathBuf>,
}

impl FoxmlLocator {
    /// Walk `root` and index every `.xml` file
    pub fn index(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(MigrationError::Config(format!(
                "FOXML directory {} does not exist",
                root.display()
            )));
        }

        let mut files: HashMap<String, PathBuf> = HashMap::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !name.ends_with(".xml") {
                continue;
            }
            if let Some(existing) = files.get(name) {
                warn!(
                    "duplicate FOXML file name {}: keeping {}, ignoring {}",
                    name,
                    existing.display(),
                    entry.path().display()
                );
                continue;
            }
            files.insert(name.to_string(), entry.path().to_path_buf());
        }

        debug!("indexed {} FOXML files under {}", files.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of the FOXML file derived from `pid`
    pub fn locate(&self, pid: &PersistentId) -> Result<&Path> {
        let name = pid.foxml_filename();
        self.files
            .get(&name)
            .map(PathBuf::as_path)
            .ok_or(MigrationError::FoxmlNotFound(name))
    }
}
