//! `DuckDB` handle for catalog and lineage metadata.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use duckdb::Connection;
use tracing::debug;

use crate::{migrations, WarehouseError};

/// Shared metadata database. Cloning is cheap; all clones serialize through
/// one connection, which gives the single-writer model the catalog and
/// lineage rely on.
#[derive(Clone)]
pub struct MetadataDb {
    path: Option<PathBuf>,
    connection: Arc<Mutex<Connection>>,
}

impl MetadataDb {
    /// Open (creating if needed) the database at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the file
    /// cannot be opened, or a migration fails.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WarehouseError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(&path)?;
        debug!(path = %path.display(), "opened metadata database");
        Self::initialize(Some(path), connection)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        Self::initialize(None, Connection::open_in_memory()?)
    }

    fn initialize(path: Option<PathBuf>, connection: Connection) -> Result<Self, WarehouseError> {
        configure_connection(&connection)?;
        migrations::apply_migrations(&connection)?;
        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Database file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the connection for the guard's lifetime.
    pub(crate) fn acquire(&self) -> Result<MutexGuard<'_, Connection>, WarehouseError> {
        self.connection
            .lock()
            .map_err(|_| WarehouseError::LockPoisoned)
    }

    /// Run `work` inside `BEGIN`/`COMMIT`, rolling back if it fails.
    pub(crate) fn transaction<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        let connection = self.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = work(&connection);
        finalize_transaction(&connection, result)
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_parent_directories_and_schema() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("catalog.duckdb");

        let db = MetadataDb::open(&path).expect("open");
        assert_eq!(db.path(), Some(path.as_path()));

        let connection = db.acquire().expect("acquire");
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_name IN ('catalog', 'lineage', 'schema_migrations')",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(tables, 3);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = MetadataDb::open_in_memory().expect("open");
        let result: Result<(), WarehouseError> = db.transaction(|connection| {
            connection.execute_batch("CREATE TABLE scratch (id INTEGER)")?;
            connection.execute_batch("INSERT INTO scratch VALUES (1)")?;
            Err(WarehouseError::InvalidConfig(String::from("abort")))
        });
        assert!(result.is_err());

        let connection = db.acquire().expect("acquire");
        let exists: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'scratch'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(exists, 0);
    }
}
