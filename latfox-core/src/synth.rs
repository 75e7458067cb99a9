//! Datastream version synthesis
//!
//! For a chain of n versions the current `<DS>.0` entry becomes `<DS>.<n-1>`
//! and every older member is inserted ahead of it as `<DS>.<i>`, so the
//! numbering follows the chain's chronology.

use tracing::{debug, error, info, warn};

use crate::archive::{fedora_timestamp, ArchiveLayout, ArchivedFile, FileState};
use crate::chain::VersionChain;
use crate::checksum::ChecksumSource;
use crate::error::{MigrationError, Result};
use crate::foxml::{BinaryVersion, FoxmlDocument, MetadataVersion, VersionEntry};
use crate::record::{ArchiveObject, CorpusNode, DatastreamKind, NodeId};
use crate::store::RecordStore;
use crate::xml::{Element, XSI_NS};

pub const CMD_LABEL: &str = "CMD Record for this object";
pub const IMDI_LABEL: &str = "IMDI Record for this object";
pub const CMDI_MIMETYPE: &str = "application/x-cmdi+xml";

/// Builds and inserts the older versions of a chain
pub struct VersionSynthesizer<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    layout: &'a ArchiveLayout,
    checksums: &'a dyn ChecksumSource,
}

impl<'a, S: RecordStore + ?Sized> VersionSynthesizer<'a, S> {
    pub fn new(store: &'a S, layout: &'a ArchiveLayout, checksums: &'a dyn ChecksumSource) -> Self {
        Self {
            store,
            layout,
            checksums,
        }
    }

    /// Apply `chain` to `doc`; returns the number of versions inserted.
    ///
    /// On error the document is left partially modified and must be
    /// discarded.
    pub fn synthesize(
        &self,
        doc: &mut FoxmlDocument,
        chain: &VersionChain,
        kind: DatastreamKind,
    ) -> Result<usize> {
        let current = kind.version_id(0);
        let renumbered = kind.version_id(chain.head_index());
        doc.rename_version(&current, &renumbered)?;

        for (index, node) in chain.older().iter().enumerate() {
            let entry = self.build_entry(node, index, kind)?;
            debug!("inserting {} for {}", entry.id(), node);
            doc.insert_version(kind.datastream_id(), entry)?;
        }
        Ok(chain.older().len())
    }

    /// Entry for the older version `node` at position `index`
    pub fn build_entry(&self, node: &NodeId, index: usize, kind: DatastreamKind) -> Result<VersionEntry> {
        let number = node.node_number()?;
        let object = self
            .store
            .archive_object(number)?
            .ok_or_else(|| MigrationError::MissingArchiveObject(node.to_string()))?;
        let url = object
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MigrationError::MissingUrl(node.to_string()))?;
        let file = self.layout.resolve(url, kind)?;

        let label = file.label();
        if !label.starts_with('v') {
            warn!("version filename does not start with a v: {}", file.path.display());
        }

        let corpus = self
            .store
            .corpus_node(number)?
            .ok_or_else(|| MigrationError::MissingCorpusNode(number.to_string()))?;

        let id = kind.version_id(index);
        let created = object.file_time.as_deref().and_then(created_value);
        match kind {
            DatastreamKind::Metadata => metadata_entry(id, created, &corpus, &file),
            DatastreamKind::Binary => Ok(self.binary_entry(id, label, created, &corpus, &object, &file)),
        }
    }

    fn binary_entry(
        &self,
        id: String,
        label: String,
        created: Option<String>,
        corpus: &CorpusNode,
        object: &ArchiveObject,
        file: &ArchivedFile,
    ) -> VersionEntry {
        let stored = object.checksum.as_deref().filter(|c| !c.trim().is_empty());
        let digest = match stored {
            Some(sum) => Some(sum.trim().to_string()),
            None if !file.exists() => {
                error!(
                    "no checksum in DB and file missing, can't compute checksum: {}",
                    file.location.display()
                );
                None
            }
            None => {
                info!("fetching checksum for {}", file.path.display());
                match self.checksums.checksum(&file.path) {
                    Ok(sum) => Some(sum),
                    Err(e) => {
                        error!("checksum for {} unavailable: {}", file.path.display(), e);
                        None
                    }
                }
            }
        };

        VersionEntry::Binary(BinaryVersion {
            id,
            label,
            created,
            mimetype: corpus.format.clone().unwrap_or_default(),
            digest,
            location: file.content_ref(),
        })
    }
}

/// CREATED for a stored file time; blank counts as no time at all
fn created_value(file_time: &str) -> Option<String> {
    if file_time.trim().is_empty() {
        return None;
    }
    let created = fedora_timestamp(file_time);
    if created.is_none() {
        warn!("unparseable file time '{}', CREATED omitted", file_time);
    }
    created
}

fn metadata_entry(
    id: String,
    created: Option<String>,
    corpus: &CorpusNode,
    file: &ArchivedFile,
) -> Result<VersionEntry> {
    let (label, mimetype) = match file.state {
        FileState::Missing => {
            error!("file does not exist on file system: {}", file.location.display());
            return Err(MigrationError::VersionFileMissing(file.location.clone()));
        }
        FileState::ImdiFallback => (IMDI_LABEL, corpus.format.clone().unwrap_or_default()),
        FileState::Present => (CMD_LABEL, CMDI_MIMETYPE.to_string()),
    };

    let data = std::fs::read_to_string(&file.path)?;
    let content = Element::parse_str(&data)?;
    let format_uri = content
        .attribute_ns(XSI_NS, "schemaLocation")
        .map(str::to_string);
    if format_uri.is_none() {
        warn!("no xsi:schemaLocation in {}, FORMAT_URI omitted", file.path.display());
    }

    Ok(VersionEntry::Metadata(MetadataVersion {
        id,
        label: label.to_string(),
        created,
        mimetype,
        format_uri,
        content,
    }))
}
