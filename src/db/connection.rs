use std::path::Path;

use rusqlite::Connection;

use crate::errors::{CkgError, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 30000;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;";

/// SQLite database holding every file's contribution to the graph.
///
/// The graph itself lives in memory; the database is only written on commit
/// and read back when a project is opened.
pub struct Database {
    conn: Connection,
}

pub(super) fn db_error(operation: &str, what: &str, e: impl std::fmt::Display) -> CkgError {
    CkgError::Database {
        message: format!("{what}: {e}"),
        operation: operation.to_string(),
    }
}

impl Database {
    /// Creates (or reuses) the database file at `db_path`, making parent
    /// directories as needed.
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| db_error("initialize", "failed to create database directory", e))?;
        }
        Self::connect(Connection::open(db_path), "initialize")
    }

    /// Opens the database at `db_path`, which must already exist.
    ///
    /// The schema is re-applied; every statement in it is idempotent.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(db_error("open", "no database at", db_path.display()));
        }
        Self::connect(Connection::open(db_path), "open")
    }

    /// A private database that disappears when dropped.
    pub fn in_memory() -> Result<Self> {
        Self::connect(Connection::open_in_memory(), "in_memory")
    }

    fn connect(conn: rusqlite::Result<Connection>, operation: &str) -> Result<Self> {
        let conn = conn.map_err(|e| db_error(operation, "failed to open database", e))?;
        conn.execute_batch(PRAGMAS)
            .map_err(|e| db_error(operation, "failed to apply pragmas", e))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| db_error(operation, "failed to apply schema", e))?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Size of the database in bytes, counted in pages.
    pub fn size(&self) -> Result<u64> {
        let pages: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .map_err(|e| db_error("size", "failed to read page count", e))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .map_err(|e| db_error("size", "failed to read page size", e))?;
        Ok((pages * page_size) as u64)
    }
}
