//! latfox core library
//!
//! Migrates version chains from the LAT corpus-structure database into
//! FOXML: each freshly generated FOXML object receives its archived older
//! versions as additional datastream versions.

pub mod archive;
pub mod chain;
pub mod checksum;
pub mod config;
pub mod error;
pub mod foxml;
pub mod locator;
pub mod migrate;
pub mod record;
pub mod remote;
pub mod sqlite_store;
pub mod store;
pub mod synth;
pub mod writer;
pub mod xml;

pub use chain::{chain_heads, reconstruct_chain, VersionChain};
pub use checksum::{ChecksumSource, LocalChecksum, RemoteChecksum};
pub use config::{ChecksumMode, MigrationConfig};
pub use error::{MigrationError, Result};
pub use foxml::{FoxmlDocument, VersionEntry};
pub use migrate::{MigrationReport, Migrator, ObjectOutcome};
pub use record::{DatastreamKind, NodeId, PersistentId};
pub use sqlite_store::SqliteRecordStore;
pub use store::{MemoryRecordStore, RecordStore};
