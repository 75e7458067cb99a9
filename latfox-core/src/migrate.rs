//! The migration loop
//!
//! Every row of the `versions` table is handled on its own: a failure is
//! logged, counted and the loop moves on. Only errors reading the row list
//! itself end the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::archive::ArchiveLayout;
use crate::chain::reconstruct_chain;
use crate::checksum::{checksum_source, ChecksumSource};
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::foxml::FoxmlDocument;
use crate::locator::FoxmlLocator;
use crate::record::{NodeId, PersistentId};
use crate::store::RecordStore;
use crate::synth::VersionSynthesizer;
use crate::writer::FoxmlWriter;

/// What happened to one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ObjectOutcome {
    /// No older versions
    SingleVersion,
    /// Another row is the newer version of this one
    Superseded,
    /// No persistent identifier for the chain head
    Deleted,
    Written { path: PathBuf, versions_added: usize },
    /// Would have been written
    DryRun { path: PathBuf, versions_added: usize },
    Failed { error: String },
}

/// A row that could not be migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedObject {
    pub node_id: String,
    pub error: String,
}

/// Counters and failures of one run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub rows: u64,
    pub single_version: u64,
    pub superseded: u64,
    pub deleted: u64,
    /// Objects written, or that would be in a dry run
    pub migrated: u64,
    pub versions_added: u64,
    pub failed: u64,
    pub failures: Vec<FailedObject>,
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            rows: 0,
            single_version: 0,
            superseded: 0,
            deleted: 0,
            migrated: 0,
            versions_added: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, node_id: &NodeId, outcome: &ObjectOutcome) {
        self.rows += 1;
        match outcome {
            ObjectOutcome::SingleVersion => self.single_version += 1,
            ObjectOutcome::Superseded => self.superseded += 1,
            ObjectOutcome::Deleted => self.deleted += 1,
            ObjectOutcome::Written { versions_added, .. }
            | ObjectOutcome::DryRun { versions_added, .. } => {
                self.migrated += 1;
                self.versions_added += *versions_added as u64;
            }
            ObjectOutcome::Failed { error } => {
                self.failed += 1;
                self.failures.push(FailedObject {
                    node_id: node_id.to_string(),
                    error: error.clone(),
                });
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Applies version chains from a record store to the FOXML tree
pub struct Migrator<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    locator: FoxmlLocator,
    layout: ArchiveLayout,
    checksums: Box<dyn ChecksumSource>,
    writer: FoxmlWriter,
    dry_run: bool,
}

impl<'a, S: RecordStore + ?Sized> Migrator<'a, S> {
    /// Index the FOXML source tree and set up the components from `config`
    pub fn new(store: &'a S, config: &MigrationConfig) -> Result<Self> {
        let paths = &config.paths;
        let locator = FoxmlLocator::index(&paths.fox_dir)?;
        info!(
            "found {} FOXML files under {}",
            locator.len(),
            locator.root().display()
        );
        Ok(Self {
            store,
            locator,
            layout: ArchiveLayout::new(&paths.versions_root_dir, paths.versions_base_url.as_str()),
            checksums: checksum_source(&config.checksum),
            writer: FoxmlWriter::new(&paths.fox_dir, &paths.target_fox_dir),
            dry_run: false,
        })
    }

    pub fn with_checksum_source(mut self, checksums: Box<dyn ChecksumSource>) -> Self {
        self.checksums = checksums;
        self
    }

    /// Do everything but write output files
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Process every row of the `versions` table
    pub fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(self.dry_run);
        for id in self.store.version_node_ids()? {
            let outcome = self.migrate_row(&id);
            report.record(&id, &outcome);
        }
        report.finish();
        Ok(report)
    }

    /// Migrate the chain ending at `id`; never fails
    pub fn migrate_row(&self, id: &NodeId) -> ObjectOutcome {
        match self.try_migrate_row(id) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: {}", id, e);
                ObjectOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn try_migrate_row(&self, id: &NodeId) -> Result<ObjectOutcome> {
        if self.store.is_superseded(id)? {
            debug!("{} is an older version of another row, skipping", id);
            return Ok(ObjectOutcome::Superseded);
        }

        let chain = reconstruct_chain(self.store, id)?;
        info!("versions: {}", chain);
        if !chain.has_history() {
            return Ok(ObjectOutcome::SingleVersion);
        }

        let pid = self
            .store
            .archive_object(id.node_number()?)?
            .and_then(|o| o.pid)
            .filter(|p| !p.is_empty());
        let Some(pid) = pid.map(PersistentId::new) else {
            warn!("no persistent identifier found for {}: deleted object?", id);
            return Ok(ObjectOutcome::Deleted);
        };

        let source = self.locator.locate(&pid)?.to_path_buf();
        debug!("{} -> {}", pid, source.display());
        let mut doc = FoxmlDocument::open(&source)?;

        let synth = VersionSynthesizer::new(self.store, &self.layout, self.checksums.as_ref());
        let versions_added = synth.synthesize(&mut doc, &chain, pid.datastream_kind())?;

        if self.dry_run {
            let path = self.writer.output_path(&source)?;
            info!("dry run, not writing {}", path.display());
            return Ok(ObjectOutcome::DryRun {
                path,
                versions_added,
            });
        }

        let path = self.writer.write(&doc, &source)?;
        info!("wrote {} with {} older versions", path.display(), versions_added);
        Ok(ObjectOutcome::Written {
            path,
            versions_added,
        })
    }
}
