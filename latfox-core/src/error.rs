//! Error types for the FOXML version migration

use std::path::PathBuf;

use crate::xml::XmlError;

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors that can occur while migrating a version chain.
///
/// Every variant is scoped to a single object: the migrator logs it, marks
/// the object failed and moves on to the next row.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("FOXML file not found: {0}")]
    FoxmlNotFound(String),

    #[error("file does not exist on file system: {}", .0.display())]
    VersionFileMissing(PathBuf),

    #[error("no archiveobjects entry found for node: {0}")]
    MissingArchiveObject(String),

    #[error("no corpusnodes entry found for node: {0}")]
    MissingCorpusNode(String),

    #[error("corpusstructure DB returns no URL for node: {0}")]
    MissingUrl(String),

    #[error("URL {url} is not below the version archive base {base}")]
    UrlOutsideArchive { url: String, base: String },

    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("FOXML has no datastream with ID {0}")]
    MissingDatastream(String),

    #[error("FOXML has no datastreamVersion with ID {0}")]
    MissingDatastreamVersion(String),

    #[error("checksum command failed: {0}")]
    Checksum(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
