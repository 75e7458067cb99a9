//! FOXML document model
//!
//! A thin typed layer over [`Element`] for the parts of FOXML the migration
//! touches: datastreams, their versions, and the content a version carries.

use std::path::Path;

use crate::error::{MigrationError, Result};
use crate::xml::{Element, XmlError};

/// FOXML namespace
pub const FOXML_NS: &str = "info:fedora/fedora-system:def/foxml#";

/// Attributes of one `datastreamVersion`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    pub id: String,
    pub label: Option<String>,
    pub created: Option<String>,
    pub mimetype: Option<String>,
    pub format_uri: Option<String>,
}

/// Older version of a metadata record, embedded inline
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataVersion {
    pub id: String,
    pub label: String,
    pub created: Option<String>,
    pub mimetype: String,
    pub format_uri: Option<String>,
    /// Root element of the archived record
    pub content: Element,
}

/// Older version of a binary object, referenced by location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryVersion {
    pub id: String,
    pub label: String,
    pub created: Option<String>,
    pub mimetype: String,
    /// MD5, when known
    pub digest: Option<String>,
    /// `file:` reference
    pub location: String,
}

/// A synthesized datastream version
#[derive(Debug, Clone, PartialEq)]
pub enum VersionEntry {
    Metadata(MetadataVersion),
    Binary(BinaryVersion),
}

impl VersionEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Metadata(v) => &v.id,
            Self::Binary(v) => &v.id,
        }
    }
}

/// Parsed FOXML digital object
#[derive(Debug, Clone)]
pub struct FoxmlDocument {
    root: Element,
}

impl FoxmlDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::parse_str(&data)
    }

    pub fn parse_str(xml: &str) -> Result<Self> {
        Self::from_root(Element::parse_str(xml)?)
    }

    /// Wrap a parsed root. Layout whitespace between FOXML elements is
    /// dropped; embedded content keeps its text as parsed.
    pub fn from_root(mut root: Element) -> Result<Self> {
        if root.namespace.as_deref() != Some(FOXML_NS) {
            return Err(XmlError::InvalidStructure(format!(
                "root element <{}> is not in the FOXML namespace",
                root.name
            ))
            .into());
        }
        root.strip_whitespace(FOXML_NS);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// `datastream` element with the given ID
    pub fn datastream(&self, id: &str) -> Option<&Element> {
        self.root
            .find(&|e: &Element| e.is(FOXML_NS, "datastream") && e.attribute("ID") == Some(id))
    }

    fn datastream_mut(&mut self, id: &str) -> Result<&mut Element> {
        self.root
            .find_mut(&|e: &Element| e.is(FOXML_NS, "datastream") && e.attribute("ID") == Some(id))
            .ok_or_else(|| MigrationError::MissingDatastream(id.to_string()))
    }

    /// `datastreamVersion` element with the given ID, in any datastream
    pub fn datastream_version(&self, id: &str) -> Option<&Element> {
        self.root.find(&|e: &Element| {
            e.is(FOXML_NS, "datastreamVersion") && e.attribute("ID") == Some(id)
        })
    }

    /// Versions of a datastream in document order
    pub fn versions(&self, datastream_id: &str) -> Vec<VersionSummary> {
        let Some(ds) = self.datastream(datastream_id) else {
            return Vec::new();
        };
        ds.child_elements()
            .filter(|e| e.is(FOXML_NS, "datastreamVersion"))
            .map(|e| VersionSummary {
                id: e.attribute("ID").unwrap_or_default().to_string(),
                label: e.attribute("LABEL").map(str::to_string),
                created: e.attribute("CREATED").map(str::to_string),
                mimetype: e.attribute("MIMETYPE").map(str::to_string),
                format_uri: e.attribute("FORMAT_URI").map(str::to_string),
            })
            .collect()
    }

    /// Change a version's ID, leaving its content untouched
    pub fn rename_version(&mut self, from: &str, to: &str) -> Result<()> {
        let version = self
            .root
            .find_mut(&|e: &Element| {
                e.is(FOXML_NS, "datastreamVersion") && e.attribute("ID") == Some(from)
            })
            .ok_or_else(|| MigrationError::MissingDatastreamVersion(from.to_string()))?;
        version.set_attribute("ID", to);
        Ok(())
    }

    /// Insert `entry` as the first version of a datastream
    pub fn insert_version(&mut self, datastream_id: &str, entry: VersionEntry) -> Result<()> {
        let datastream = self.datastream_mut(datastream_id)?;
        let element = match entry {
            VersionEntry::Metadata(v) => metadata_element(datastream, v),
            VersionEntry::Binary(v) => binary_element(datastream, v),
        };
        datastream.prepend_element(element);
        Ok(())
    }

    pub fn to_xml_string(&self) -> Result<String> {
        Ok(self.root.to_document_string()?)
    }

    /// Write with declaration; FOXML markup is re-indented
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_xml_string()?)?;
        Ok(())
    }
}

fn version_element(
    datastream: &Element,
    id: &str,
    label: &str,
    created: Option<&str>,
    mimetype: &str,
) -> Element {
    let mut version = Element::new(datastream.sibling_name("datastreamVersion"), Some(FOXML_NS))
        .with_attribute("ID", id)
        .with_attribute("LABEL", label);
    if let Some(created) = created {
        version.set_attribute("CREATED", created);
    }
    version.set_attribute("MIMETYPE", mimetype);
    version
}

fn metadata_element(datastream: &Element, v: MetadataVersion) -> Element {
    let mut version = version_element(datastream, &v.id, &v.label, v.created.as_deref(), &v.mimetype);
    if let Some(uri) = v.format_uri {
        version.set_attribute("FORMAT_URI", uri);
    }
    let mut content = Element::new(datastream.sibling_name("xmlContent"), Some(FOXML_NS));
    content.push_element(v.content);
    version.push_element(content);
    version
}

fn binary_element(datastream: &Element, v: BinaryVersion) -> Element {
    let mut version = version_element(datastream, &v.id, &v.label, v.created.as_deref(), &v.mimetype);
    if let Some(digest) = v.digest {
        version.push_element(
            Element::new(datastream.sibling_name("contentDigest"), Some(FOXML_NS))
                .with_attribute("TYPE", "MD5")
                .with_attribute("DIGEST", digest),
        );
    }
    version.push_element(
        Element::new(datastream.sibling_name("contentLocation"), Some(FOXML_NS))
            .with_attribute("TYPE", "URL")
            .with_attribute("REF", v.location),
    );
    version
}
