//! Version chain reconstruction
//!
//! A chain is rebuilt by walking `olderversion` backlinks from a starting
//! node until a row has no older version. The walk ends silently at an id
//! with no row of its own; it is treated as the start of the chain.

use std::collections::HashSet;

use tracing::warn;

use crate::error::Result;
use crate::record::NodeId;
use crate::store::RecordStore;

/// Versions of one archived object, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChain {
    versions: Vec<NodeId>,
}

impl VersionChain {
    /// Build from ids ordered oldest to newest
    pub fn new(versions: Vec<NodeId>) -> Self {
        Self { versions }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Only chains with older versions are migrated
    pub fn has_history(&self) -> bool {
        self.versions.len() > 1
    }

    /// Newest member; the object's current id
    pub fn head(&self) -> Option<&NodeId> {
        self.versions.last()
    }

    /// Every member but the head, oldest first
    pub fn older(&self) -> &[NodeId] {
        match self.versions.split_last() {
            Some((_, older)) => older,
            None => &[],
        }
    }

    /// Index the current version receives after migration
    pub fn head_index(&self) -> usize {
        self.versions.len().saturating_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.versions.iter()
    }
}

impl std::fmt::Display for VersionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, id) in self.versions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(id.as_str())?;
        }
        Ok(())
    }
}

/// Walk `olderversion` links back from `start` and return the chain.
pub fn reconstruct_chain<S: RecordStore + ?Sized>(store: &S, start: &NodeId) -> Result<VersionChain> {
    let mut versions = vec![start.clone()];
    let mut seen: HashSet<NodeId> = HashSet::from([start.clone()]);
    let mut current = start.clone();

    while let Some(Some(older)) = store.older_version(&current)? {
        if !seen.insert(older.clone()) {
            warn!("version cycle at {} while walking back from {}", older, start);
            break;
        }
        versions.push(older.clone());
        current = older;
    }

    versions.reverse();
    Ok(VersionChain::new(versions))
}

/// Chains of every row that is not itself an older version, in table order
pub fn chain_heads<S: RecordStore + ?Sized>(store: &S) -> Result<Vec<VersionChain>> {
    let mut chains = Vec::new();
    for id in store.version_node_ids()? {
        if store.is_superseded(&id)? {
            continue;
        }
        chains.push(reconstruct_chain(store, &id)?);
    }
    Ok(chains)
}
