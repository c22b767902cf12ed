use std::env;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ferrotick_core::{PriceScale, ValidationConfig};
use serde::{Deserialize, Serialize};

use crate::WarehouseError;

/// On-disk encoding of partition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Columnar Parquet written through DuckDB.
    Parquet,
    /// Chunked binary blocks with per-chunk compression.
    Block,
}

impl StorageFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Block => "block",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Block => "ftb",
        }
    }
}

impl Display for StorageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageFormat {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "block" | "ftb" => Ok(Self::Block),
            other => Err(WarehouseError::InvalidConfig(format!(
                "unsupported storage format '{other}'"
            ))),
        }
    }
}

/// Configuration for the warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for ferrotick data.
    pub home: PathBuf,
    /// Path to the `DuckDB` catalog database file.
    pub db_path: PathBuf,
    /// Root of the partitioned data files.
    pub data_dir: PathBuf,
    pub storage_format: StorageFormat,
    /// Fixed-point scale for persisted prices.
    pub price_scale: PriceScale,
    /// Rows per block in the block backend.
    pub block_rows: usize,
    pub parquet_row_group_size: usize,
    pub validation: ValidationConfig,
}

impl WarehouseConfig {
    /// Derive every path from `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            db_path: home.join("catalog").join("catalog.duckdb"),
            data_dir: home.join("data"),
            home,
            storage_format: StorageFormat::Parquet,
            price_scale: PriceScale::default(),
            block_rows: 8_192,
            parquet_row_group_size: 122_880,
            validation: ValidationConfig::default(),
        }
    }

    #[must_use]
    pub fn storage_format(mut self, format: StorageFormat) -> Self {
        self.storage_format = format;
        self
    }

    pub fn home(&self) -> &Path {
        self.home.as_path()
    }

    pub(crate) fn check(&self) -> Result<(), WarehouseError> {
        if self.block_rows == 0 {
            return Err(WarehouseError::InvalidConfig(String::from(
                "block_rows must be greater than zero",
            )));
        }
        if self.parquet_row_group_size == 0 {
            return Err(WarehouseError::InvalidConfig(String::from(
                "parquet_row_group_size must be greater than zero",
            )));
        }
        Ok(())
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::with_home(resolve_ferrotick_home())
    }
}

/// Resolve the ferrotick home directory from environment or default.
pub fn resolve_ferrotick_home() -> PathBuf {
    if let Some(path) = env::var_os("FERROTICK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ferrotick");
    }

    PathBuf::from(".ferrotick")
}
