use rusqlite::params;
use rusqlite::OptionalExtension;

use super::connection::{db_error, Database};
use crate::errors::Result;
use crate::graph::Contribution;
use crate::types::*;

/// Maps a row from the `files` table to a `FileRecord`.
///
/// An unknown language or malformed `top_level` column is an error rather
/// than a guess.
fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let language: String = row.get("language")?;
    let language = LanguageId::from_str(&language).ok_or_else(|| {
        conversion_error(format!("unknown language '{language}'").into())
    })?;
    let top_level: String = row.get("top_level")?;
    let top_level = serde_json::from_str(&top_level).map_err(|e| conversion_error(Box::new(e)))?;
    Ok(FileRecord {
        path: row.get("path")?,
        language,
        content_hash: row.get("content_hash")?,
        indexed_at: row.get("indexed_at")?,
        seq: row.get::<_, i64>("seq")? as u64,
        top_level,
        symbol_count: row.get::<_, i64>("symbol_count")? as u32,
    })
}

fn conversion_error(e: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e)
}

// ---------------------------------------------------------------------------
// Contributions
// ---------------------------------------------------------------------------

impl Database {
    /// Stores a file's contribution, replacing any previous one.
    pub fn save_contribution(&self, contribution: &Contribution) -> Result<()> {
        let record = &contribution.record;
        let top_level = serde_json::to_string(&record.top_level)?;
        let payload = serde_json::to_string(contribution)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO files
                    (path, language, content_hash, indexed_at, seq, symbol_count, top_level, contribution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.path,
                    record.language.as_str(),
                    record.content_hash,
                    record.indexed_at,
                    record.seq as i64,
                    record.symbol_count as i64,
                    top_level,
                    payload,
                ],
            )
            .map_err(|e| db_error("save_contribution", "failed to save contribution", e))?;
        Ok(())
    }

    /// Every stored contribution, in commit order.
    pub fn load_contributions(&self) -> Result<Vec<Contribution>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT contribution FROM files ORDER BY seq, path")
            .map_err(|e| db_error("load_contributions", "failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| db_error("load_contributions", "failed to query contributions", e))?;

        let mut contributions = Vec::new();
        for row in rows {
            let payload =
                row.map_err(|e| db_error("load_contributions", "failed to read row", e))?;
            contributions.push(serde_json::from_str(&payload)?);
        }
        Ok(contributions)
    }

    /// Deletes a file's row. Deleting an unknown path is not an error.
    pub fn delete_file(&self, path: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(|e| db_error("delete_file", "failed to delete file", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

impl Database {
    /// Retrieves a file record by path, returning `None` if not found.
    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        self.conn()
            .query_row(
                "SELECT path, language, content_hash, indexed_at, seq, symbol_count, top_level
                 FROM files WHERE path = ?1",
                params![path],
                row_to_file,
            )
            .optional()
            .map_err(|e| db_error("get_file", "failed to get file", e))
    }

    /// All file records, ordered by path.
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT path, language, content_hash, indexed_at, seq, symbol_count, top_level
                 FROM files ORDER BY path",
            )
            .map_err(|e| db_error("get_all_files", "failed to prepare query", e))?;

        let rows = stmt
            .query_map([], row_to_file)
            .map_err(|e| db_error("get_all_files", "failed to query all files", e))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| db_error("get_all_files", "failed to read file row", e))?);
        }
        Ok(files)
    }

    pub fn file_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| db_error("file_count", "failed to count files", e))?;
        Ok(count as u64)
    }

    /// Removes every stored contribution.
    pub fn clear(&self) -> Result<()> {
        self.conn()
            .execute_batch("DELETE FROM files;")
            .map_err(|e| db_error("clear", "failed to clear database", e))
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

impl Database {
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| db_error("set_metadata", "failed to set metadata", e))?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("get_metadata", "failed to get metadata", e))
    }
}
