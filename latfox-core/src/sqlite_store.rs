//! SQLite-backed record store
//!
//! Reads a snapshot of the corpus-structure database. The connection is
//! opened read-only and reused serially for every lookup.

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use crate::error::{MigrationError, Result};
use crate::record::{ArchiveObject, CorpusNode, NodeId};
use crate::store::RecordStore;

const REQUIRED_TABLES: [&str; 3] = ["versions", "archiveobjects", "corpusnodes"];

fn open_corpus_db(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(MigrationError::Config(format!(
            "corpus database not found at {}",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(conn)
}

fn check_schema(conn: &Connection) -> Result<()> {
    let mut stmt =
        conn.prepare_cached("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1")?;
    for table in REQUIRED_TABLES {
        let count: i64 = stmt.query_row([table], |r| r.get(0))?;
        if count == 0 {
            return Err(MigrationError::Config(format!(
                "corpus database has no '{}' table",
                table
            )));
        }
    }
    Ok(())
}

/// Corpus-structure tables in an SQLite database
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open a database file read-only and check that the tables exist
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_corpus_db(path)?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Result<Self> {
        check_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn count_versions(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM versions", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

impl RecordStore for SqliteRecordStore {
    fn version_node_ids(&self) -> Result<Vec<NodeId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT CAST(nodeid AS TEXT) FROM versions ORDER BY rowid")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id: Option<String> = row.get(0)?;
            if let Some(id) = id {
                ids.push(NodeId::new(id));
            }
        }
        Ok(ids)
    }

    fn older_version(&self, id: &NodeId) -> Result<Option<Option<NodeId>>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT CAST(olderversion AS TEXT) FROM versions WHERE nodeid=?1 LIMIT 1",
        )?;
        let older: Option<Option<String>> = stmt
            .query_row([id.as_str()], |r| r.get(0))
            .optional()?;
        Ok(older.map(|o| o.map(NodeId::new)))
    }

    fn is_superseded(&self, id: &NodeId) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM versions WHERE olderversion=?1)")?;
        let found: i64 = stmt.query_row([id.as_str()], |r| r.get(0))?;
        Ok(found != 0)
    }

    fn archive_object(&self, node_number: &str) -> Result<Option<ArchiveObject>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT CAST(nodeid AS TEXT), CAST(pid AS TEXT), CAST(filetime AS TEXT), \
             CAST(url AS TEXT), CAST(checksum AS TEXT) \
             FROM archiveobjects WHERE nodeid=?1 LIMIT 1",
        )?;
        let object = stmt
            .query_row([node_number], |r| {
                Ok(ArchiveObject {
                    node_id: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    pid: r.get(1)?,
                    file_time: r.get(2)?,
                    url: r.get(3)?,
                    checksum: r.get(4)?,
                })
            })
            .optional()?;
        Ok(object)
    }

    fn corpus_node(&self, node_number: &str) -> Result<Option<CorpusNode>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT CAST(nodeid AS TEXT), CAST(format AS TEXT) FROM corpusnodes WHERE nodeid=?1 LIMIT 1",
        )?;
        let node = stmt
            .query_row([node_number], |r| {
                Ok(CorpusNode {
                    node_id: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    format: r.get(1)?,
                })
            })
            .optional()?;
        Ok(node)
    }
}
