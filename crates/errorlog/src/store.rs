//! SQLite-backed error-log repository.
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::error::LogError;
use crate::model::ApplicationError;
use crate::Result;

/// SQLite datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for the error-log table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS application_errors (
    id INTEGER PRIMARY KEY,
    site_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    exception_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    full_message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_application_errors_site ON application_errors (site_id);
";

const SELECT_COLUMNS: &str =
    "SELECT id, site_id, message, exception_type, timestamp, full_message FROM application_errors";

/// SQLite-backed error log.
///
/// Create with [`ErrorLog::open`] for file-backed persistence or
/// [`ErrorLog::in_memory`] for tests.
pub struct ErrorLog {
    conn: Mutex<Connection>,
}

impl ErrorLog {
    /// Open or create the error-log database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory error log (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LogError::LockPoisoned)
    }

    /// Insert a harvested batch in a single transaction; either every row
    /// lands or none does.
    pub fn insert_batch(&self, errors: &[ApplicationError]) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        for error in errors {
            tx.execute(
                "INSERT INTO application_errors \
                 (id, site_id, message, exception_type, timestamp, full_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    error.id,
                    error.site_id,
                    error.message,
                    error.exception_type,
                    to_sqlite(error.timestamp),
                    error.full_message,
                ],
            )?;
        }
        tx.commit()?;
        debug!(rows = errors.len(), "application error batch stored");
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<ApplicationError>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id],
                row_to_error,
            )
            .optional()?;
        Ok(row)
    }

    /// The most recently inserted error, by id.
    pub fn get_latest(&self) -> Result<Option<ApplicationError>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1"),
                [],
                row_to_error,
            )
            .optional()?;
        Ok(row)
    }

    /// Errors newest-first by timestamp; `max` of 0 means no limit.
    pub fn get_by_date_descending(&self, max: u32) -> Result<Vec<ApplicationError>> {
        let conn = self.lock_conn()?;
        let sql = if max == 0 {
            format!("{SELECT_COLUMNS} ORDER BY timestamp DESC")
        } else {
            format!("{SELECT_COLUMNS} ORDER BY timestamp DESC LIMIT {max}")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Errors for one site, newest-first; `oldest` keeps only rows strictly
    /// after the given instant.
    pub fn get_by_site(
        &self,
        site_id: u32,
        oldest: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApplicationError>> {
        let conn = self.lock_conn()?;
        let rows = match oldest {
            Some(oldest) => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE site_id = ?1 AND timestamp > ?2 ORDER BY timestamp DESC"
                ))?;
                let rows = stmt.query_map(params![site_id, to_sqlite(oldest)], row_to_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE site_id = ?1 ORDER BY timestamp DESC"
                ))?;
                let rows = stmt.query_map([site_id], row_to_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Total number of stored errors, optionally from `oldest` (inclusive)
    /// onwards.
    pub fn total_count(&self, oldest: Option<DateTime<Utc>>) -> Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = match oldest {
            Some(oldest) => conn.query_row(
                "SELECT COUNT(*) FROM application_errors WHERE timestamp >= ?1",
                [to_sqlite(oldest)],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM application_errors", [], |row| {
                row.get(0)
            })?,
        };
        Ok(count as u64)
    }

    /// Number of stored errors for one site, optionally from `oldest`
    /// (inclusive) onwards.
    pub fn count_by_site(&self, site_id: u32, oldest: Option<DateTime<Utc>>) -> Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = match oldest {
            Some(oldest) => conn.query_row(
                "SELECT COUNT(*) FROM application_errors WHERE site_id = ?1 AND timestamp >= ?2",
                params![site_id, to_sqlite(oldest)],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM application_errors WHERE site_id = ?1",
                [site_id],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }
}

fn to_sqlite(timestamp: DateTime<Utc>) -> String {
    timestamp.format(SQLITE_DATETIME_FMT).to_string()
}

fn row_to_error(row: &Row<'_>) -> rusqlite::Result<ApplicationError> {
    let raw: String = row.get(4)?;
    let timestamp = NaiveDateTime::parse_from_str(&raw, SQLITE_DATETIME_FMT)
        .map(|ndt| ndt.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(ApplicationError {
        id: row.get(0)?,
        site_id: row.get(1)?,
        message: row.get(2)?,
        exception_type: row.get(3)?,
        timestamp,
        full_message: row.get(5)?,
    })
}
