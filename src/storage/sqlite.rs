use rusqlite::{Connection, Result};
use tracing::debug;

use super::models::{FileClassification, FileNamePart};

const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
    pub(super) pending: ChangeSet,
}

/// Classification writes staged until the next `save_changes`.
#[derive(Debug, Default)]
pub(super) struct ChangeSet {
    pub(super) classifications: Vec<FileClassification>,
    /// Parts for classifications that are not part of `classifications`,
    /// keyed by `(name, search_level)`.
    pub(super) parts: Vec<((String, i64), Vec<FileNamePart>)>,
}

impl ChangeSet {
    pub(super) fn is_empty(&self) -> bool {
        self.classifications.is_empty() && self.parts.iter().all(|(_, parts)| parts.is_empty())
    }

    pub(super) fn clear(&mut self) {
        self.classifications.clear();
        self.parts.clear();
    }
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Database {
            conn,
            pending: ChangeSet::default(),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    /// Create any missing tables. Classification data is not recomputable,
    /// so older versions are upgraded in place rather than dropped.
    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        self.conn.execute_batch(include_str!("schema.sql"))?;

        if version < SCHEMA_VERSION {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
            debug!("SQLite schema migrated from version {} to {}", version, SCHEMA_VERSION);
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether classification changes are staged but not saved.
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM file_detail_classification;
             DELETE FROM file_detail;
             DELETE FROM file_name_part;
             DELETE FROM file_classification;
             DELETE FROM scan_run;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}
