//! Record model for the corpus-structure database
//!
//! The `versions` table links node ids (`MPI1234#`) to their older version;
//! `archiveobjects` and `corpusnodes` are keyed by the bare node number.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

lazy_static! {
    static ref NODE_ID_RE: Regex = Regex::new(r"^MPI(\d+)#$").unwrap();
}

/// Node identifier as stored in the `versions` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the textual id for a bare node number
    pub fn from_number(number: u64) -> Self {
        Self(format!("MPI{}#", number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part used to key `archiveobjects` and `corpusnodes`
    pub fn node_number(&self) -> Result<&str> {
        NODE_ID_RE
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| MigrationError::InvalidNodeId(self.0.clone()))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row of the `versions` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub node_id: NodeId,
    pub older_version: Option<NodeId>,
}

impl VersionRecord {
    pub fn new(node_id: NodeId, older_version: Option<NodeId>) -> Self {
        Self {
            node_id,
            older_version,
        }
    }
}

/// Row of the `archiveobjects` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveObject {
    /// Bare node number
    pub node_id: String,
    /// Handle persistent identifier
    pub pid: Option<String>,
    /// Timestamp as stored (`YYYY-MM-DD HH:MM:SS`)
    pub file_time: Option<String>,
    pub url: Option<String>,
    /// MD5 if the archive already computed one
    pub checksum: Option<String>,
}

/// Row of the `corpusnodes` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusNode {
    pub node_id: String,
    /// Mimetype
    pub format: Option<String>,
}

/// Suffix marking a metadata record's persistent identifier
const METADATA_PID_SUFFIX: &str = "format=imdi";

/// Handle-style persistent identifier of an archived object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentId(String);

impl PersistentId {
    pub fn new(pid: impl Into<String>) -> Self {
        Self(pid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which FOXML datastream holds this object's content
    pub fn datastream_kind(&self) -> DatastreamKind {
        if self.0.ends_with(METADATA_PID_SUFFIX) {
            DatastreamKind::Metadata
        } else {
            DatastreamKind::Binary
        }
    }

    /// Name of the FOXML file generated for this identifier
    pub fn foxml_filename(&self) -> String {
        let name = self
            .0
            .replace("hdl:", "")
            .replace('/', "_")
            .replace('-', "_")
            .replace("@format=imdi", "_CMD");
        format!("lat_{}.xml", name)
    }
}

impl std::fmt::Display for PersistentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Datastream a version chain is migrated into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatastreamKind {
    /// Inline XML metadata record (`CMD`)
    Metadata,
    /// Externally referenced content (`OBJ`)
    Binary,
}

impl DatastreamKind {
    pub fn datastream_id(&self) -> &'static str {
        match self {
            Self::Metadata => "CMD",
            Self::Binary => "OBJ",
        }
    }

    /// Datastream version id, e.g. `OBJ.2`
    pub fn version_id(&self, index: usize) -> String {
        format!("{}.{}", self.datastream_id(), index)
    }
}

impl std::fmt::Display for DatastreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.datastream_id())
    }
}
