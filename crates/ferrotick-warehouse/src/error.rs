use std::path::PathBuf;

use ferrotick_core::{PartitionError, SchemaError, ValidationError, ValidationReport};
use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Input batch has the wrong shape.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InvalidPartition(#[from] PartitionError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The batch failed at least one Critical check and the ingest was
    /// aborted before anything was written.
    #[error("{critical_count} critical validation issue(s) for {symbol}")]
    CriticalValidation {
        symbol: String,
        critical_count: usize,
        report: Box<ValidationReport>,
    },

    /// A stored file could not be decoded.
    #[error("corrupt file {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    /// A file's current content hash differs from the recorded one.
    #[error("hash mismatch for {}: expected {expected}, found {actual}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// No catalog or lineage entry matches the request.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// Error returned by a data provider, passed through unchanged.
    #[error("provider error: {0}")]
    Provider(Box<dyn std::error::Error + Send + Sync>),

    #[error("metadata connection lock poisoned")]
    LockPoisoned,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WarehouseError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }
}
