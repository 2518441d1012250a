//! Copies rows from the source export into the normalized tables.
//!
//! Columns are renamed through [`mapping`]; link-managed key columns are left
//! NULL for the link engine.

pub mod mapping;

use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{quote_ident, Store};
use crate::error::Result;
use crate::metrics::ImportMetrics;
use crate::validate::{self, FlaggedRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Imported,
    /// The source table exists but holds no rows
    Empty,
    MissingInSource,
    /// None of the mapped columns are present in the source table
    NoColumns,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableImport {
    pub table: String,
    pub status: ImportStatus,
    pub inserted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub tables: Vec<TableImport>,
    /// Imported reinforcement rows whose values look wrong
    pub flagged: Vec<FlaggedRow>,
}

impl ImportReport {
    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.tables.iter().map(|t| t.failed).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableImport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

pub struct Importer<'a> {
    source: &'a Store,
    dest: &'a mut Store,
}

impl<'a> Importer<'a> {
    pub fn new(source: &'a Store, dest: &'a mut Store) -> Self {
        Self { source, dest }
    }

    /// Import every mapped table.
    ///
    /// Each table is copied in its own transaction with foreign keys off.
    /// Rows the normalized schema rejects are counted, not fatal.
    pub fn import_all(&mut self) -> Result<ImportReport> {
        self.dest.set_foreign_keys(false)?;

        let mut report = ImportReport::default();
        for table in mapping::tables_to_import() {
            let result = self.import_table(table)?;
            info!(
                table = %result.table,
                status = ?result.status,
                inserted = result.inserted,
                failed = result.failed,
                "Imported table"
            );
            report.tables.push(result);
        }

        report.flagged = validate::check_reinforcing_table(&*self.dest)?;
        ImportMetrics::record_rows_flagged(report.flagged.len());

        info!(
            inserted = report.total_inserted(),
            failed = report.total_failed(),
            flagged = report.flagged.len(),
            "Import complete"
        );
        Ok(report)
    }

    pub fn import_table(&mut self, table: &str) -> Result<TableImport> {
        let mut result = TableImport {
            table: table.to_string(),
            status: ImportStatus::Imported,
            inserted: 0,
            failed: 0,
        };

        if !self.source.table_exists(table)? {
            warn!(table, "Table missing from source export");
            ImportMetrics::record_table_missing();
            result.status = ImportStatus::MissingInSource;
            return Ok(result);
        }

        let available: Vec<String> = self
            .source
            .table_columns(table)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let columns = mapping::columns_to_copy(table, &available);
        if columns.is_empty() {
            warn!(table, "No mapped columns present in source table");
            result.status = ImportStatus::NoColumns;
            return Ok(result);
        }

        let select = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|(src, _)| quote_ident(src))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(table)
        );
        let rows: Vec<Vec<Value>> = {
            let mut stmt = self.source.connection().prepare(&select)?;
            let width = columns.len();
            let rows = stmt
                .query_map([], |row| {
                    (0..width)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        if rows.is_empty() {
            result.status = ImportStatus::Empty;
            return Ok(result);
        }

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns
                .iter()
                .map(|(_, dst)| quote_ident(dst))
                .collect::<Vec<_>>()
                .join(", "),
            (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let tx = self.dest.connection_mut().transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in &rows {
                match stmt.execute(params_from_iter(row.iter())) {
                    Ok(_) => result.inserted += 1,
                    Err(e) => {
                        debug!(table, error = %e, "Row rejected");
                        result.failed += 1;
                    }
                }
            }
        }
        tx.commit()?;

        ImportMetrics::record_table_imported(result.inserted, result.failed);
        Ok(result)
    }
}
