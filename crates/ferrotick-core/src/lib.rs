//! # Ferrotick Core
//!
//! Domain types and in-memory processing for the Ferrotick market data
//! store.
//!
//! ## Overview
//!
//! This crate holds everything that does not touch disk or the metadata
//! database:
//!
//! - **Canonical records** for ticks and OHLCV bars with validated symbols,
//!   granularities, and UTC timestamps
//! - **Columnar batches** used as the unit of ingestion, storage, and reads
//! - **Validation pipeline** producing structured quality reports
//! - **Cleaning transforms** for duplicates, gaps, spikes, and zero volume
//! - **Partitioning** of datasets into time-based files
//! - **Content hashing** of bytes, files, and batches
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | `RecordBatch`, columns, and batch kinds |
//! | [`cleaner`] | Corrective transforms |
//! | [`domain`] | Symbols, granularities, timestamps, ticks, and bars |
//! | [`error`] | Core error types |
//! | [`hasher`] | SHA-256 digests |
//! | [`partition`] | Partition keys and windows |
//! | [`validation`] | Quality checks and reports |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrotick_core::{Granularity, RecordBatch, ValidationPipeline};
//!
//! let batch: RecordBatch = load_bars();
//! let report = ValidationPipeline::default()
//!     .validate(&batch, "EURUSD", Some(Granularity::H1), &[])?;
//! if report.has_critical() {
//!     eprintln!("{}", report.summary());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Data Provider  │
//! └────────┬────────┘
//!          │ RecordBatch
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Validation    │────▶│  Data Cleaner    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Partitioning  │────▶│ Content Hashing  │
//! └─────────────────┘     └──────────────────┘
//!          │
//!          ▼
//!   ferrotick-warehouse
//! ```

pub mod batch;
pub mod cleaner;
pub mod domain;
pub mod error;
pub mod hasher;
pub mod partition;
mod stats;
#[cfg(test)]
mod test_support;
pub mod validation;

pub use batch::{BatchKind, Column, ColumnKind, RecordBatch, TIMESTAMP_COLUMN};
pub use cleaner::{
    CleanerConfig, CleaningOutcome, DataCleaner, FillMethod, SpikeReplacement, VolumeFillMethod,
};
pub use domain::{Bar, Granularity, PriceScale, Record, Symbol, Tick, TimeRange, UtcDateTime};
pub use error::{CheckError, CoreError, PartitionError, SchemaError, ValidationError};
pub use hasher::{ContentHasher, HashInput};
pub use partition::{PartitionStrategy, ALL_PARTITION, TICKS_DATASET};
pub use validation::{
    CheckContext, CheckFailure, IssueKind, Severity, ValidationConfig, ValidationIssue,
    ValidationPipeline, ValidationReport, Validator,
};
