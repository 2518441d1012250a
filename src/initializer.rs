use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::db::Store;
use crate::error::{MigrateError, Result};
use crate::metrics::SchemaMetrics;
use crate::schema;

/// Outcome of creating the empty normalized database
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub database: PathBuf,
    pub tables_created: Vec<String>,
    /// Tables present after creation (including pre-existing ones)
    pub tables_verified: Vec<String>,
}

/// Creates the normalized tables from the static schema; imports no data.
pub struct SchemaInitializer {
    db_path: PathBuf,
    recreate: bool,
}

impl SchemaInitializer {
    pub fn new<P: AsRef<Path>>(db_path: P, recreate: bool) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            recreate,
        }
    }

    pub fn initialize(&self) -> Result<InitReport> {
        if self.recreate && self.db_path.exists() {
            warn!(path = %self.db_path.display(), "Removing existing database");
            std::fs::remove_file(&self.db_path)?;
        }

        let store = Store::create(&self.db_path)?;
        let tables_created = create_tables(&store)?;
        let tables_verified = store.table_names()?;

        info!(
            created = tables_created.len(),
            present = tables_verified.len(),
            "Schema initialization complete"
        );
        debug!(tables = ?tables_verified, "Tables in database");

        Ok(InitReport {
            database: self.db_path.clone(),
            tables_created,
            tables_verified,
        })
    }
}

/// Execute the schema script against `store` and seed the general-input row.
///
/// Stops at the first statement that fails, naming its table.
pub fn create_tables(store: &Store) -> Result<Vec<String>> {
    store.set_foreign_keys(false)?;

    let mut created = Vec::new();
    for statement in schema::create_table_statements() {
        let table = schema::extract_table_name(&statement).unwrap_or_else(|| "Unknown".to_string());
        if let Err(e) = store.connection().execute_batch(&statement) {
            error!(table = %table, error = %e, "Failed to create table");
            return Err(MigrateError::Schema(format!("{}: {}", table, e)));
        }
        info!(table = %table, "Created table");
        SchemaMetrics::record_table_created();
        created.push(table);
    }

    store
        .connection()
        .execute(schema::GENERAL_INPUT_SEED_SQL, [])?;
    store.set_foreign_keys(true)?;

    Ok(created)
}
