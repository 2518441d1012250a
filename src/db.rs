use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

/// A single SQLite database: either the normalized store or the source export.
///
/// All statements run in autocommit mode unless a caller opens a transaction
/// explicitly; there is no long-lived cursor across calls.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

/// One column as reported by `pragma_table_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Rows that break a declared foreign key, grouped by child and parent table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityViolation {
    pub table: String,
    pub parent: String,
    pub rows: u64,
}

impl Store {
    /// Open (creating if needed) a database file, including its directory.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::enforcing(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Opened database");
        Ok(store)
    }

    /// Open an existing database for reading and writing; never creates one.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MigrateError::MissingDatabase(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        // SQLite opens lazily; touch the schema so a bad file fails here
        let store = Self::enforcing(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Opened database");
        Ok(store)
    }

    /// Open an existing database without write access (the source export).
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MigrateError::MissingDatabase(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::enforcing(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::enforcing(conn, None)
    }

    /// Every store starts with foreign key enforcement on, whatever the
    /// SQLite build defaults to.
    fn enforcing(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        let store = Self { conn, path };
        store.check_readable()?;
        store.set_foreign_keys(true)?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn check_readable(&self) -> rusqlite::Result<()> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|_| ())
    }

    // Referential integrity

    pub fn set_foreign_keys(&self, enabled: bool) -> rusqlite::Result<()> {
        let value = if enabled { "ON" } else { "OFF" };
        self.conn
            .execute_batch(&format!("PRAGMA foreign_keys = {};", value))?;
        debug!(enabled, "foreign key enforcement changed");
        Ok(())
    }

    pub fn foreign_keys_enabled(&self) -> rusqlite::Result<bool> {
        let on: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(on == 1)
    }

    /// Run `PRAGMA foreign_key_check` over the whole database.
    pub fn foreign_key_violations(&self) -> rusqlite::Result<Vec<IntegrityViolation>> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        let mut grouped: BTreeMap<(String, String), u64> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            let parent: String = row.get(2)?;
            *grouped.entry((table, parent)).or_insert(0) += 1;
        }
        Ok(grouped
            .into_iter()
            .map(|((table, parent), rows)| IntegrityViolation {
                table,
                parent,
                rows,
            })
            .collect())
    }

    // Introspection

    pub fn table_names(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> rusqlite::Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Columns of `table` in declaration order; empty when the table is missing.
    pub fn table_columns(&self, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    decl_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    primary_key: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &str) -> rusqlite::Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn count_nulls(&self, table: &str, column: &str) -> rusqlite::Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
            quote_ident(table),
            quote_ident(column)
        );
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether an error means the store itself is unusable, as opposed to one
/// statement being wrong.
pub fn is_fatal(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Render a stored value for reports.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
