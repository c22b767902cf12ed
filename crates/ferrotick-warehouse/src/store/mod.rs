//! Partitioned file storage.
//!
//! | Backend | Extension | Encoding |
//! |---------|-----------|----------|
//! | [`ParquetStore`] | `.parquet` | Parquet (ZSTD) via DuckDB |
//! | [`BlockStore`] | `.ftb` | fixed-size blocks, Snappy chunks, CRC32 |
//!
//! Both backends share the directory layout in [`layout`] and the generic
//! [`PartitionedStore`]; only the per-file codec differs. Prices are written
//! as fixed-point integers and converted back to `f64` on read.

mod block;
pub mod layout;
mod parquet;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferrotick_core::{
    BatchKind, Column, Granularity, PartitionStrategy, PriceScale, RecordBatch, SchemaError,
    Symbol, TimeRange,
};
use tracing::debug;

use crate::{StorageFormat, WarehouseConfig, WarehouseError};

pub use block::BlockCodec;
pub use parquet::ParquetCodec;

pub type ParquetStore = PartitionedStore<ParquetCodec>;
pub type BlockStore = PartitionedStore<BlockCodec>;

/// How a write treats files already present in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Add an incremental `part-NNNN` file beside existing ones.
    #[default]
    Append,
    /// Replace every file of the partition with one canonical file.
    Overwrite,
}

/// Summary of a single stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub row_count: u64,
    pub byte_size: u64,
    /// `None` for files without rows.
    pub time_range: Option<TimeRange>,
    pub columns: Vec<Column>,
}

/// Persists record batches as partition files.
///
/// Writes require a non-empty batch carrying every mandatory column of its
/// kind. Reads push the time range and column list down to the file codec.
pub trait DataStore: Send + Sync {
    fn format(&self) -> StorageFormat;

    fn base_dir(&self) -> &Path;

    /// Write one partition and return the path of the file created.
    fn write(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        batch: &RecordBatch,
        partition: &str,
        mode: WriteMode,
    ) -> Result<PathBuf, WarehouseError>;

    /// Rows of every partition (or only `partition`) overlapping `range`,
    /// sorted by timestamp. Duplicates across incremental files are kept.
    fn read(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
        partition: Option<&str>,
    ) -> Result<RecordBatch, WarehouseError>;

    /// Every row of one stored file, in stored order.
    fn read_file(&self, path: &Path, kind: BatchKind) -> Result<RecordBatch, WarehouseError>;

    fn list_symbols(&self) -> Result<Vec<Symbol>, WarehouseError>;

    /// Datasets stored for `symbol`; `None` is tick data.
    fn list_granularities(&self, symbol: &Symbol)
        -> Result<Vec<Option<Granularity>>, WarehouseError>;

    fn list_partitions(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
    ) -> Result<Vec<String>, WarehouseError>;

    /// Existing files of a partition: canonical file first, then parts in
    /// sequence order.
    fn partition_files(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> Result<Vec<PathBuf>, WarehouseError>;

    /// Canonical path of a partition, whether or not it exists.
    fn partition_path(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> PathBuf;

    /// Remove the files of one partition, or of the whole dataset. Returns
    /// the number of files removed; absent files are not an error.
    fn delete(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: Option<&str>,
    ) -> Result<usize, WarehouseError>;

    fn file_info(&self, path: &Path) -> Result<FileInfo, WarehouseError>;

    fn write_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        batch: &RecordBatch,
        partition: &str,
    ) -> Result<PathBuf, WarehouseError> {
        batch.expect_kind(BatchKind::Bars)?;
        self.write(symbol, Some(granularity), batch, partition, WriteMode::Append)
    }

    fn write_ticks(
        &self,
        symbol: &Symbol,
        batch: &RecordBatch,
        partition: &str,
    ) -> Result<PathBuf, WarehouseError> {
        batch.expect_kind(BatchKind::Ticks)?;
        self.write(symbol, None, batch, partition, WriteMode::Append)
    }

    fn read_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
        partition: Option<&str>,
    ) -> Result<RecordBatch, WarehouseError> {
        self.read(symbol, Some(granularity), range, columns, partition)
    }

    fn read_ticks(
        &self,
        symbol: &Symbol,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
        partition: Option<&str>,
    ) -> Result<RecordBatch, WarehouseError> {
        self.read(symbol, None, range, columns, partition)
    }
}

/// Encodes one batch per file.
pub trait PartitionCodec: Send + Sync {
    fn format(&self) -> StorageFormat;

    /// Write `batch` to `path`, replacing any existing file.
    fn encode(&self, batch: &RecordBatch, path: &Path) -> Result<(), WarehouseError>;

    /// Rows within `range` (all rows if `None`), restricted to `columns`
    /// that the file contains (all of them if `None`), in file order.
    fn decode(
        &self,
        path: &Path,
        kind: BatchKind,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
    ) -> Result<RecordBatch, WarehouseError>;

    /// Row count, timestamp bounds, and columns; `byte_size` is filled in by
    /// the store.
    fn describe(&self, path: &Path) -> Result<FileInfo, WarehouseError>;
}

/// [`DataStore`] over the shared directory layout and a file codec.
#[derive(Debug, Clone)]
pub struct PartitionedStore<C> {
    base_dir: PathBuf,
    codec: C,
}

impl<C: PartitionCodec> PartitionedStore<C> {
    pub fn with_codec(base_dir: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            base_dir: base_dir.into(),
            codec,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn read_files(
        &self,
        kind: BatchKind,
        files: &[PathBuf],
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
    ) -> Result<Vec<RecordBatch>, WarehouseError> {
        files
            .iter()
            .map(|path| self.codec.decode(path, kind, range, columns))
            .collect()
    }
}

impl<C: PartitionCodec> DataStore for PartitionedStore<C> {
    fn format(&self) -> StorageFormat {
        self.codec.format()
    }

    fn base_dir(&self) -> &Path {
        self.base_dir.as_path()
    }

    fn write(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        batch: &RecordBatch,
        partition: &str,
        mode: WriteMode,
    ) -> Result<PathBuf, WarehouseError> {
        if batch.is_empty() {
            return Err(SchemaError::EmptyBatch.into());
        }
        batch.expect_kind(BatchKind::for_granularity(granularity))?;
        batch.require_columns(batch.kind().mandatory_columns())?;
        PartitionStrategy::parse_partition_range(partition)?;

        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        fs::create_dir_all(&dir)?;
        let format = self.format();
        let existing = layout::partition_files(&dir, partition, format)?;

        let target = match mode {
            WriteMode::Overwrite => layout::canonical_path(&dir, partition, format),
            WriteMode::Append if existing.is_empty() => {
                layout::canonical_path(&dir, partition, format)
            }
            WriteMode::Append => layout::next_part_path(&dir, partition, format, &existing),
        };

        let staged = layout::staging_path(&target);
        if let Err(error) = self.codec.encode(batch, &staged) {
            let _ = fs::remove_file(&staged);
            return Err(error);
        }
        if mode == WriteMode::Overwrite {
            for path in &existing {
                fs::remove_file(path)?;
            }
        }
        fs::rename(&staged, &target)?;

        debug!(
            symbol = %symbol,
            partition,
            rows = batch.len(),
            path = %target.display(),
            ?mode,
            "wrote partition file"
        );
        Ok(target)
    }

    fn read(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
        partition: Option<&str>,
    ) -> Result<RecordBatch, WarehouseError> {
        let kind = BatchKind::for_granularity(granularity);
        if let Some(columns) = columns {
            if let Some(foreign) = columns.iter().find(|column| !kind.allows(**column)) {
                return Err(SchemaError::ForeignColumn {
                    column: foreign.to_string(),
                    kind: kind.to_string(),
                }
                .into());
            }
        }

        let partitions = match partition {
            Some(partition) => vec![partition.to_owned()],
            None => self.list_partitions(symbol, granularity)?,
        };

        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        let mut batches = Vec::new();
        for partition in &partitions {
            let window = PartitionStrategy::parse_partition_range(partition)?;
            if let Some(range) = range {
                if !window.overlaps(range.start_us(), range.end_us()) {
                    continue;
                }
            }
            let files = layout::partition_files(&dir, partition, self.format())?;
            batches.extend(self.read_files(kind, &files, range, columns)?);
        }

        let batch = if batches.is_empty() {
            empty_projection(kind, columns)
        } else {
            RecordBatch::concat(&batches)?
        };
        if let Some(columns) = columns {
            batch.require_columns(columns)?;
        }
        Ok(batch.sorted_by_timestamp())
    }

    fn read_file(&self, path: &Path, kind: BatchKind) -> Result<RecordBatch, WarehouseError> {
        self.codec.decode(path, kind, None, None)
    }

    fn list_symbols(&self) -> Result<Vec<Symbol>, WarehouseError> {
        let mut symbols: Vec<Symbol> = layout::subdirectories(&self.base_dir)?
            .iter()
            .filter_map(|name| Symbol::parse(name).ok())
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    fn list_granularities(
        &self,
        symbol: &Symbol,
    ) -> Result<Vec<Option<Granularity>>, WarehouseError> {
        let dir = self.base_dir.join(symbol.as_str());
        let mut datasets: Vec<Option<Granularity>> = layout::subdirectories(&dir)?
            .iter()
            .filter_map(|name| layout::parse_dataset(name))
            .collect();
        datasets.sort();
        datasets.dedup();
        Ok(datasets)
    }

    fn list_partitions(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
    ) -> Result<Vec<String>, WarehouseError> {
        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        Ok(layout::list_partitions(&dir, self.format())?)
    }

    fn partition_files(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> Result<Vec<PathBuf>, WarehouseError> {
        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        Ok(layout::partition_files(&dir, partition, self.format())?)
    }

    fn partition_path(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> PathBuf {
        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        layout::canonical_path(&dir, partition, self.format())
    }

    fn delete(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: Option<&str>,
    ) -> Result<usize, WarehouseError> {
        let partitions = match partition {
            Some(partition) => vec![partition.to_owned()],
            None => self.list_partitions(symbol, granularity)?,
        };

        let dir = layout::dataset_dir(&self.base_dir, symbol, granularity);
        let mut deleted = 0;
        for partition in &partitions {
            for path in layout::partition_files(&dir, partition, self.format())? {
                match fs::remove_file(&path) {
                    Ok(()) => deleted += 1,
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
        layout::remove_empty_dirs(&dir, &self.base_dir);

        debug!(symbol = %symbol, ?partition, deleted, "deleted partition files");
        Ok(deleted)
    }

    fn file_info(&self, path: &Path) -> Result<FileInfo, WarehouseError> {
        let byte_size = fs::metadata(path)?.len();
        let mut info = self.codec.describe(path)?;
        info.byte_size = byte_size;
        Ok(info)
    }
}

impl PartitionedStore<ParquetCodec> {
    pub fn parquet(
        base_dir: impl Into<PathBuf>,
        price_scale: PriceScale,
        row_group_size: usize,
    ) -> Self {
        Self::with_codec(base_dir, ParquetCodec::new(price_scale, row_group_size))
    }
}

impl PartitionedStore<BlockCodec> {
    pub fn block(
        base_dir: impl Into<PathBuf>,
        price_scale: PriceScale,
        block_rows: usize,
    ) -> Self {
        Self::with_codec(base_dir, BlockCodec::new(price_scale, block_rows))
    }
}

/// Store for the configured format rooted at `config.data_dir`.
pub fn open_store(config: &WarehouseConfig) -> Result<Arc<dyn DataStore>, WarehouseError> {
    config.check()?;
    fs::create_dir_all(&config.data_dir)?;
    Ok(match config.storage_format {
        StorageFormat::Parquet => Arc::new(ParquetStore::parquet(
            config.data_dir.clone(),
            config.price_scale,
            config.parquet_row_group_size,
        )),
        StorageFormat::Block => Arc::new(BlockStore::block(
            config.data_dir.clone(),
            config.price_scale,
            config.block_rows,
        )),
    })
}

/// Fixed-point value of a price; `None` for null.
pub(crate) fn fixed_price(scale: PriceScale, value: f64) -> Result<Option<i64>, WarehouseError> {
    if value.is_nan() {
        return Ok(None);
    }
    Ok(Some(scale.to_fixed(value)?))
}

fn empty_projection(kind: BatchKind, columns: Option<&[Column]>) -> RecordBatch {
    let empty = RecordBatch::empty(kind);
    match columns {
        Some(columns) => empty.select(columns).unwrap_or(empty),
        None => empty,
    }
}


#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::test_batches::{hourly_bars, HOUR_US, JAN_1_2024};
    use super::*;

    fn stores(base: &Path) -> Vec<Box<dyn DataStore>> {
        vec![
            Box::new(ParquetStore::parquet(base.join("pq"), PriceScale::default(), 16)),
            Box::new(BlockStore::block(base.join("blk"), PriceScale::default(), 16)),
        ]
    }

    fn eurusd() -> Symbol {
        Symbol::parse("EURUSD").expect("symbol")
    }

    #[test]
    fn append_creates_parts_and_overwrite_collapses_them() {
        let temp = tempdir().expect("tempdir");
        for store in stores(temp.path()) {
            let first = store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(JAN_1_2024, 10), "2024")
                .expect("first write");
            let second = store
                .write_bars(
                    &eurusd(),
                    Granularity::H1,
                    &hourly_bars(JAN_1_2024 + 10 * HOUR_US, 5),
                    "2024",
                )
                .expect("second write");
            assert_eq!(first, store.partition_path(&eurusd(), Some(Granularity::H1), "2024"));
            assert_ne!(first, second);
            assert!(second.to_string_lossy().contains(".part-0001."));

            let files = store
                .partition_files(&eurusd(), Some(Granularity::H1), "2024")
                .expect("files");
            assert_eq!(files, vec![first.clone(), second]);

            store
                .write(
                    &eurusd(),
                    Some(Granularity::H1),
                    &hourly_bars(JAN_1_2024, 3),
                    "2024",
                    WriteMode::Overwrite,
                )
                .expect("overwrite");
            let files = store
                .partition_files(&eurusd(), Some(Granularity::H1), "2024")
                .expect("files");
            assert_eq!(files, vec![first]);
        }
    }

    #[test]
    fn rejects_empty_and_incomplete_batches() {
        let temp = tempdir().expect("tempdir");
        for store in stores(temp.path()) {
            let empty = RecordBatch::empty(BatchKind::Bars);
            let error = store
                .write_bars(&eurusd(), Granularity::H1, &empty, "2024")
                .expect_err("empty");
            assert!(matches!(error, WarehouseError::Schema(SchemaError::EmptyBatch)));

            let partial = hourly_bars(JAN_1_2024, 3)
                .select(&[Column::Close])
                .expect("select");
            let error = store
                .write_bars(&eurusd(), Granularity::H1, &partial, "2024")
                .expect_err("partial");
            assert!(matches!(
                error,
                WarehouseError::Schema(SchemaError::MissingColumns { .. })
            ));
            assert!(store.list_symbols().expect("symbols").is_empty());
        }
    }

    #[test]
    fn reads_prune_partitions_and_project_columns() {
        let temp = tempdir().expect("tempdir");
        let jan_2025 = 1_735_689_600_000_000;
        for store in stores(temp.path()) {
            store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(JAN_1_2024, 24), "2024")
                .expect("write 2024");
            store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(jan_2025, 24), "2025")
                .expect("write 2025");

            let range = TimeRange::new(jan_2025, jan_2025 + 5 * HOUR_US).expect("range");
            let batch = store
                .read_bars(&eurusd(), Granularity::H1, Some(range), Some(&[Column::Close]), None)
                .expect("read");
            assert_eq!(batch.len(), 6);
            assert_eq!(batch.column_names(), vec![Column::Close]);
            assert_eq!(batch.timestamps()[0], jan_2025);

            assert_eq!(
                store.list_partitions(&eurusd(), Some(Granularity::H1)).expect("partitions"),
                vec!["2024", "2025"]
            );
            assert_eq!(
                store.list_granularities(&eurusd()).expect("granularities"),
                vec![Some(Granularity::H1)]
            );
        }
    }

    #[test]
    fn reading_missing_data_is_empty() {
        let temp = tempdir().expect("tempdir");
        for store in stores(temp.path()) {
            let batch = store
                .read_ticks(&eurusd(), None, Some(&[Column::Bid]), None)
                .expect("read");
            assert!(batch.is_empty());
            assert_eq!(batch.column_names(), vec![Column::Bid]);
        }
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        for store in stores(temp.path()) {
            store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(JAN_1_2024, 4), "2024")
                .expect("write");
            store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(JAN_1_2024, 4), "2024")
                .expect("write");

            assert_eq!(store.delete(&eurusd(), Some(Granularity::H1), None).expect("delete"), 2);
            assert_eq!(store.delete(&eurusd(), Some(Granularity::H1), None).expect("delete"), 0);
            assert!(store.list_symbols().expect("symbols").is_empty());
        }
    }

    #[test]
    fn file_info_reports_rows_and_bounds() {
        let temp = tempdir().expect("tempdir");
        for store in stores(temp.path()) {
            let path = store
                .write_bars(&eurusd(), Granularity::H1, &hourly_bars(JAN_1_2024, 40), "2024")
                .expect("write");
            let info = store.file_info(&path).expect("info");
            assert_eq!(info.row_count, 40);
            assert!(info.byte_size > 0);
            let range = info.time_range.expect("range");
            assert_eq!(range.start_us(), JAN_1_2024);
            assert_eq!(range.end_us(), JAN_1_2024 + 39 * HOUR_US);
            assert_eq!(
                info.columns,
                vec![Column::Open, Column::High, Column::Low, Column::Close, Column::TickVolume]
            );
        }
    }
}
