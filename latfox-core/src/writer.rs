//! Output of migrated FOXML into the target tree

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrationError, Result};
use crate::foxml::FoxmlDocument;

/// Mirrors the source tree layout under the target directory
#[derive(Debug, Clone)]
pub struct FoxmlWriter {
    source_dir: PathBuf,
    target_dir: PathBuf,
}

impl FoxmlWriter {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Target path for a file from the source tree
    pub fn output_path(&self, source: &Path) -> Result<PathBuf> {
        let relative = source.strip_prefix(&self.source_dir).map_err(|_| {
            MigrationError::Config(format!(
                "{} is outside the FOXML directory {}",
                source.display(),
                self.source_dir.display()
            ))
        })?;
        Ok(self.target_dir.join(relative))
    }

    /// Write `doc` to the target counterpart of `source` and return its path
    pub fn write(&self, doc: &FoxmlDocument, source: &Path) -> Result<PathBuf> {
        let output = self.output_path(source)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        doc.write_to(&output)?;
        Ok(output)
    }
}
