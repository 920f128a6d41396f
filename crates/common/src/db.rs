//! SQLite access to the target application's backing store
//!
//! The schema belongs to the application under test, so nothing here
//! creates tables. The store only inserts fixture rows, reads them back and
//! answers capability questions ("is there a `photos` table?").

use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits on a lock held by the running application.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the backing store shared by every fixture factory in a run
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
}

impl Store {
    /// Open an existing database. A missing or unreadable file is an
    /// infrastructure failure, never a reason to create a fresh database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let unavailable = |e: rusqlite::Error| Error::StoreUnavailable {
            location: location.clone(),
            reason: e.to_string(),
        };

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
        // journal_mode returns a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(unavailable)?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |_| Ok(()))
            .map_err(unavailable)?;

        info!("Opened backing store at {}", location);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.into(),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".into(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Expose the underlying connection for callers that need queries the
    /// store does not wrap.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Run raw SQL. Used by tooling and tests to seed a schema.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    // ========================================================================
    // Capability queries
    // ========================================================================

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Column names of a table, empty when the table does not exist.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let table = quote_identifier(table)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self.columns(table)?.iter().any(|c| c == column))
    }

    // ========================================================================
    // Record access
    // ========================================================================

    /// Insert a row and return its rowid. Rails timestamp columns are filled
    /// in when the table has them.
    ///
    /// The raw SQLite error is returned so callers can tell uniqueness
    /// violations apart from schema rejections.
    pub fn insert(&self, table: &str, attributes: &[(String, Value)]) -> std::result::Result<i64, rusqlite::Error> {
        let quoted_table = quote_identifier(table).map_err(identifier_error)?;
        let mut columns = Vec::with_capacity(attributes.len() + 2);
        let mut values: Vec<Value> = Vec::with_capacity(attributes.len() + 2);
        for (column, value) in attributes {
            columns.push(quote_identifier(column).map_err(identifier_error)?);
            values.push(value.clone());
        }

        let existing = self.columns(table).map_err(|e| match e {
            Error::Database(inner) => inner,
            other => identifier_error(other),
        })?;
        let now = rails_timestamp();
        for stamp in ["created_at", "updated_at"] {
            let already_set = attributes.iter().any(|(c, _)| c == stamp);
            if !already_set && existing.iter().any(|c| c == stamp) {
                columns.push(format!("\"{}\"", stamp));
                values.push(Value::Text(now.clone()));
            }
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted_table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(values.iter()))?;
        let id = conn.last_insert_rowid();

        debug!("Inserted {} row with id {}", table, id);
        Ok(id)
    }

    /// Read an integer column of one row. `Ok(None)` when the row is missing
    /// or the value is NULL.
    pub fn integer_column(&self, table: &str, id: i64, column: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            quote_identifier(column)?,
            quote_identifier(table)?
        );
        let conn = self.conn.lock();
        let value: Option<Option<i64>> = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        Ok(value.flatten())
    }

    /// Count rows whose `column` equals `value`.
    pub fn count_where(&self, table: &str, column: &str, value: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_identifier(table)?,
            quote_identifier(column)?
        );
        let conn = self.conn.lock();
        let count = conn.query_row(&sql, params![value], |row| row.get(0))?;
        Ok(count)
    }
}

/// Whether a failed insert tripped a UNIQUE constraint.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, message) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || (e.code == ErrorCode::ConstraintViolation
                    && message.as_deref().is_some_and(|m| m.contains("UNIQUE")))
        }
        _ => false,
    }
}

/// Timestamp in the format ActiveRecord writes to SQLite.
pub fn rails_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Quote a table or column name. Only plain identifiers are accepted since
/// the names end up inside SQL text.
fn quote_identifier(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

fn identifier_error(err: Error) -> rusqlite::Error {
    rusqlite::Error::InvalidParameterName(err.to_string())
}
