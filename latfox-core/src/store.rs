//! Read-only access to the corpus-structure tables
//!
//! The migration only ever asks three kinds of questions of the database, so
//! they are expressed as a small trait. `SqliteRecordStore` answers them from
//! a database file; `MemoryRecordStore` answers them from plain records.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::record::{ArchiveObject, CorpusNode, NodeId, VersionRecord};

/// Record store interface
pub trait RecordStore {
    /// Every node id of the `versions` table, in table order
    fn version_node_ids(&self) -> Result<Vec<NodeId>>;

    /// Older version of `id`.
    ///
    /// `None` when `id` has no row, `Some(None)` when its row has no older
    /// version.
    fn older_version(&self, id: &NodeId) -> Result<Option<Option<NodeId>>>;

    /// Whether another row names `id` as its older version
    fn is_superseded(&self, id: &NodeId) -> Result<bool>;

    /// `archiveobjects` row for a bare node number
    fn archive_object(&self, node_number: &str) -> Result<Option<ArchiveObject>>;

    /// `corpusnodes` row for a bare node number
    fn corpus_node(&self, node_number: &str) -> Result<Option<CorpusNode>>;
}

/// In-memory record store
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    versions: Vec<VersionRecord>,
    archive_objects: HashMap<String, ArchiveObject>,
    corpus_nodes: HashMap<String, CorpusNode>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_version(&mut self, node_id: &str, older_version: Option<&str>) -> &mut Self {
        self.versions.push(VersionRecord::new(
            NodeId::new(node_id),
            older_version.map(NodeId::new),
        ));
        self
    }

    pub fn add_archive_object(&mut self, object: ArchiveObject) -> &mut Self {
        self.archive_objects.insert(object.node_id.clone(), object);
        self
    }

    pub fn add_corpus_node(&mut self, node_number: &str, format: Option<&str>) -> &mut Self {
        self.corpus_nodes.insert(
            node_number.to_string(),
            CorpusNode {
                node_id: node_number.to_string(),
                format: format.map(str::to_string),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn version_node_ids(&self) -> Result<Vec<NodeId>> {
        Ok(self.versions.iter().map(|r| r.node_id.clone()).collect())
    }

    fn older_version(&self, id: &NodeId) -> Result<Option<Option<NodeId>>> {
        Ok(self
            .versions
            .iter()
            .find(|r| &r.node_id == id)
            .map(|r| r.older_version.clone()))
    }

    fn is_superseded(&self, id: &NodeId) -> Result<bool> {
        let older: HashSet<&NodeId> = self
            .versions
            .iter()
            .filter_map(|r| r.older_version.as_ref())
            .collect();
        Ok(older.contains(id))
    }

    fn archive_object(&self, node_number: &str) -> Result<Option<ArchiveObject>> {
        Ok(self.archive_objects.get(node_number).cloned())
    }

    fn corpus_node(&self, node_number: &str) -> Result<Option<CorpusNode>> {
        Ok(self.corpus_nodes.get(node_number).cloned())
    }
}
