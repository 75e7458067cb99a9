//! Archived version files
//!
//! Older versions live in the version archive and are published under a
//! base URL. The database stores that URL; the file on disk is found by
//! swapping the base URL for the archive root.

use chrono::{DateTime, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{MigrationError, Result};
use crate::record::DatastreamKind;

/// Query suffix the web front-end appends to converted metadata URLs
const OUT_FORMAT_SUFFIX: &str = "&outFormat=imdi";

/// What was found on disk for an archived version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// The file the URL points at exists
    Present,
    /// Only the IMDI sibling of a CMDI record exists
    ImdiFallback,
    Missing,
}

/// An archived version's file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    /// Path derived from the URL, used as the content location
    pub location: PathBuf,
    /// Path actually read; differs from `location` after the IMDI fallback
    pub path: PathBuf,
    pub state: FileState,
}

impl ArchivedFile {
    pub fn exists(&self) -> bool {
        self.state != FileState::Missing
    }

    /// Base name of the file read
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `contentLocation` reference
    pub fn content_ref(&self) -> String {
        format!("file:{}", self.location.display())
    }
}

/// Mapping between archive URLs and the archive on disk
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    base_url: String,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    /// Local path for an archive URL
    pub fn local_path(&self, url: &str) -> Result<PathBuf> {
        let relative = url
            .strip_prefix(self.base_url.as_str())
            .ok_or_else(|| MigrationError::UrlOutsideArchive {
                url: url.to_string(),
                base: self.base_url.clone(),
            })?
            .replace(OUT_FORMAT_SUFFIX, "");
        Ok(self.root.join(relative.trim_start_matches('/')))
    }

    /// Resolve the file behind `url`.
    ///
    /// Old metadata versions may only exist as IMDI even though the database
    /// names a CMDI file, so for metadata a missing `.cmdi` falls back to the
    /// `.imdi` sibling.
    pub fn resolve(&self, url: &str, kind: DatastreamKind) -> Result<ArchivedFile> {
        let location = self.local_path(url)?;
        if location.is_file() {
            return Ok(ArchivedFile {
                path: location.clone(),
                location,
                state: FileState::Present,
            });
        }

        if kind == DatastreamKind::Metadata {
            if let Some(imdi) = imdi_sibling(&location) {
                if imdi.is_file() {
                    info!("metadata file is in IMDI format, not CMDI: {}", imdi.display());
                    return Ok(ArchivedFile {
                        location,
                        path: imdi,
                        state: FileState::ImdiFallback,
                    });
                }
            }
        }

        Ok(ArchivedFile {
            path: location.clone(),
            location,
            state: FileState::Missing,
        })
    }
}

fn imdi_sibling(path: &Path) -> Option<PathBuf> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("cmdi") => Some(path.with_extension("imdi")),
        _ => None,
    }
}

/// Reformat a stored file time as a complete ISO-8601 instant.
///
/// The database keeps local wall-clock time without a zone; it is written
/// as-is with a `Z` suffix. A trailing UTC offset is dropped without
/// converting the time. Fractional seconds are dropped.
pub fn fedora_timestamp(file_time: &str) -> Option<String> {
    let raw = file_time.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| {
            NaiveDateTime::parse_from_str(raw, fmt).ok().or_else(|| {
                DateTime::parse_from_str(raw, &format!("{}%#z", fmt))
                    .ok()
                    .map(|dt| dt.naive_local())
            })
        })
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S.000Z").to_string())
}
