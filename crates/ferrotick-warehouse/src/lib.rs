//! # Ferrotick Warehouse
//!
//! Partitioned market-data storage with a DuckDB metadata catalog.
//!
//! ## Overview
//!
//! Validated record batches are split into time partitions, written to
//! Parquet or block files, hashed, and registered in a catalog. Lineage
//! records and manifests capture exact content hashes so a consumer can later
//! prove which bytes it read and whether they have changed since.
//!
//! ```text
//!  DataProvider ──► StorageManager ──► ValidationPipeline
//!                        │
//!                        ├──► PartitionStrategy::split
//!                        ├──► DataStore (Parquet | Block) ──► {data}/{SYMBOL}/{H1|ticks}/{key}.{ext}
//!                        ├──► layout::hash_partition
//!                        └──► DataCatalog ──► DuckDB (catalog, lineage)
//!                                  │
//!                    DataLineage ◄─┴─► DataManifest ──► manifest.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrotick_core::{Granularity, RecordBatch, Symbol, TimeRange};
//! use ferrotick_warehouse::{
//!     DataProvider, IngestOptions, ProviderError, StorageManager, WarehouseConfig,
//! };
//!
//! struct Replay(RecordBatch);
//!
//! impl DataProvider for Replay {
//!     fn fetch_bars(
//!         &self,
//!         _symbol: &Symbol,
//!         _granularity: Granularity,
//!         range: TimeRange,
//!     ) -> Result<RecordBatch, ProviderError> {
//!         Ok(self.0.filter_range(range))
//!     }
//!
//!     fn fetch_ticks(&self, _symbol: &Symbol, range: TimeRange) -> Result<RecordBatch, ProviderError> {
//!         Ok(self.0.filter_range(range))
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = StorageManager::open(&WarehouseConfig::default())?;
//!     let symbol = Symbol::parse("EURUSD")?;
//!     let provider = Replay(RecordBatch::empty(ferrotick_core::BatchKind::Bars));
//!
//!     let result = manager.ingest(
//!         &provider,
//!         &symbol,
//!         Some(Granularity::H1),
//!         TimeRange::full(),
//!         &IngestOptions::default(),
//!     )?;
//!     println!("wrote {} rows", result.rows_written());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Paths, storage format and tuning |
//! | [`db`] | Shared DuckDB handle with migrations |
//! | [`store`] | `DataStore` trait, Parquet and block backends |
//! | [`catalog`] | Partition → file index |
//! | [`lineage`] | Per-run records of consumed file hashes |
//! | [`manifest`] | Portable catalog snapshots |
//! | [`manager`] | Ingest, compaction and deletion |
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `catalog` | One row per partition, keyed by canonical file path |
//! | `lineage` | Append-only (run, file, hash) records |
//! | `schema_migrations` | Applied migration versions |

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod lineage;
pub mod manager;
pub mod manifest;
mod migrations;
pub mod store;

pub use catalog::{CatalogEntry, CatalogQuery, CatalogRegistration, CatalogStats, DataCatalog};
pub use config::{resolve_ferrotick_home, StorageFormat, WarehouseConfig};
pub use db::MetadataDb;
pub use error::WarehouseError;
pub use lineage::{DataLineage, FileReference, LineageRecord, ReproducibilityReport, RunId};
pub use manager::{
    CompactResult, DataProvider, DeleteResult, IngestOptions, IngestResult, PartitionFailure,
    PartitionOutcome, ProviderError, StorageManager,
};
pub use manifest::{
    DataManifest, Manifest, ManifestChange, ManifestDiff, ManifestEntry, ManifestKey,
    ManifestVerification,
};
pub use store::{
    open_store, BlockCodec, BlockStore, DataStore, FileInfo, ParquetCodec, ParquetStore,
    PartitionCodec, PartitionedStore, WriteMode,
};
