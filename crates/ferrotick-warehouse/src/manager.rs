//! Ingest orchestration: fetch, validate, partition, write, hash, register.
//!
//! Each partition is written and registered under its own advisory lock.
//! Partitions are independent: a failure in one is reported in the
//! [`IngestResult`] and does not undo partitions already registered.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ferrotick_core::{
    BatchKind, Column, Granularity, PartitionStrategy, RecordBatch, Severity, Symbol, TimeRange,
    ValidationConfig, ValidationError, ValidationPipeline, ValidationReport,
};
use tracing::{debug, info, info_span, warn, Span};

use crate::catalog::{CatalogEntry, CatalogQuery, CatalogRegistration, DataCatalog};
use crate::lineage::DataLineage;
use crate::store::{layout, open_store, DataStore, WriteMode};
use crate::{MetadataDb, WarehouseConfig, WarehouseError};

/// Error type returned by providers; surfaced as [`WarehouseError::Provider`].
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Source of raw market data. Batches are expected in ascending timestamp
/// order.
pub trait DataProvider {
    fn fetch_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
    ) -> Result<RecordBatch, ProviderError>;

    fn fetch_ticks(&self, symbol: &Symbol, range: TimeRange) -> Result<RecordBatch, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Run the validation pipeline before writing.
    pub validate: bool,
    /// Abort the ingest when validation reports a Critical issue.
    pub critical_only: bool,
    /// Recorded as the catalog entry's `data_source`.
    pub source: Option<String>,
    pub write_mode: WriteMode,
    /// Columns the batch must carry; empty means the kind's mandatory set.
    pub required_columns: Vec<Column>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            validate: true,
            critical_only: true,
            source: None,
            write_mode: WriteMode::Append,
            required_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOutcome {
    pub partition_key: String,
    /// File created by this write; a part file when appending.
    pub written_path: PathBuf,
    pub rows_written: usize,
    /// Catalog state of the whole partition after the write.
    pub entry: CatalogEntry,
}

#[derive(Debug)]
pub struct PartitionFailure {
    pub partition_key: String,
    pub error: WarehouseError,
}

#[derive(Debug)]
pub struct IngestResult {
    pub symbol: Symbol,
    pub granularity: Option<Granularity>,
    pub rows_fetched: usize,
    pub partitions: Vec<PartitionOutcome>,
    pub failures: Vec<PartitionFailure>,
    /// `None` when validation was disabled or nothing was fetched.
    pub report: Option<ValidationReport>,
}

impl IngestResult {
    fn empty(symbol: &Symbol, granularity: Option<Granularity>) -> Self {
        Self {
            symbol: symbol.clone(),
            granularity,
            rows_fetched: 0,
            partitions: Vec::new(),
            failures: Vec::new(),
            report: None,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.partitions.iter().map(|p| p.rows_written).sum()
    }

    /// Every partition was written and registered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactResult {
    pub files_merged: usize,
    pub rows_before: usize,
    pub rows_after: usize,
    pub duplicates_removed: usize,
    /// `false` when the partition was already one clean file, or absent.
    pub rewritten: bool,
    pub content_hash: Option<String>,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub files_deleted: usize,
    pub entries_deleted: usize,
}

/// Advisory locks keyed by `(symbol, dataset, partition)`. Entries live
/// only while some caller holds a lease on them.
#[derive(Default)]
struct PartitionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PartitionLocks {
    fn lease(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> PartitionLease<'_> {
        let key = format!(
            "{symbol}/{}/{partition}",
            PartitionStrategy::dataset(granularity)
        );
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        PartitionLease {
            owner: self,
            key,
            lock,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Shared handle on one partition lock. The map entry is removed when the
/// last lease drops.
struct PartitionLease<'a> {
    owner: &'a PartitionLocks,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl PartitionLease<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PartitionLease<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Coordinates the store, the validation pipeline and the catalog.
pub struct StorageManager {
    store: Arc<dyn DataStore>,
    db: MetadataDb,
    catalog: DataCatalog,
    pipeline: ValidationPipeline,
    locks: PartitionLocks,
    span: Span,
}

impl StorageManager {
    /// Open the store and metadata database described by `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or either backend
    /// cannot be opened.
    pub fn open(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let store = open_store(config)?;
        let db = MetadataDb::open(config.db_path.clone())?;
        Ok(Self::new(store, db, config.validation.clone()))
    }

    pub fn new(store: Arc<dyn DataStore>, db: MetadataDb, validation: ValidationConfig) -> Self {
        let span = info_span!("storage_manager", format = %store.format());
        Self {
            catalog: DataCatalog::in_span(db.clone(), &span),
            pipeline: ValidationPipeline::in_span(validation, &span),
            store,
            db,
            locks: PartitionLocks::default(),
            span,
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn catalog(&self) -> &DataCatalog {
        &self.catalog
    }

    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.pipeline
    }

    /// Lineage store sharing this manager's metadata database.
    pub fn lineage(&self) -> DataLineage {
        DataLineage::in_span(self.db.clone(), &self.span)
    }

    /// Fetch `range` from `provider` and store it. Bars for
    /// `Some(granularity)`, ticks for `None`.
    ///
    /// Rows arriving out of order are sorted (stably) before validation.
    ///
    /// # Errors
    /// Provider and schema errors, [`ValidationError::NonPositiveTimestamp`]
    /// for any row at or before the epoch, and [`WarehouseError::CriticalValidation`]
    /// when `critical_only` is set and a Critical issue is found, abort
    /// before anything is written. Per-partition failures are collected in
    /// [`IngestResult::failures`] instead.
    pub fn ingest(
        &self,
        provider: &dyn DataProvider,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        range: TimeRange,
        options: &IngestOptions,
    ) -> Result<IngestResult, WarehouseError> {
        let _entered = self.span.enter();
        let batch = match granularity {
            Some(granularity) => provider.fetch_bars(symbol, granularity, range),
            None => provider.fetch_ticks(symbol, range),
        }
        .map_err(WarehouseError::Provider)?;

        if batch.is_empty() {
            info!(symbol = %symbol, ?granularity, "provider returned no rows");
            return Ok(IngestResult::empty(symbol, granularity));
        }
        batch.expect_kind(BatchKind::for_granularity(granularity))?;
        if let Some(&value) = batch.timestamps().iter().find(|&&ts| ts <= 0) {
            return Err(ValidationError::NonPositiveTimestamp { value }.into());
        }
        let batch = if batch.is_sorted() {
            batch
        } else {
            warn!(symbol = %symbol, ?granularity, "provider returned rows out of order");
            batch.sorted_by_timestamp()
        };

        let required = if options.required_columns.is_empty() {
            batch.kind().mandatory_columns().to_vec()
        } else {
            options.required_columns.clone()
        };

        let report = if options.validate {
            let report = self
                .pipeline
                .validate(&batch, symbol.as_str(), granularity, &required)?;
            if options.critical_only && report.has_critical() {
                let critical_count = report.count_by_severity(Severity::Critical);
                warn!(symbol = %symbol, critical_count, "aborting ingest on critical issues");
                return Err(WarehouseError::CriticalValidation {
                    symbol: symbol.to_string(),
                    critical_count,
                    report: Box::new(report),
                });
            }
            Some(report)
        } else {
            batch.require_columns(&required)?;
            None
        };

        let mut result = IngestResult::empty(symbol, granularity);
        result.rows_fetched = batch.len();
        result.report = report;

        for (partition, rows) in PartitionStrategy::split(&batch, granularity)? {
            match self.store_partition(symbol, granularity, &partition, &rows, options) {
                Ok(outcome) => result.partitions.push(outcome),
                Err(error) => {
                    warn!(symbol = %symbol, partition = %partition, %error, "partition ingest failed");
                    result.failures.push(PartitionFailure {
                        partition_key: partition,
                        error,
                    });
                }
            }
        }

        info!(
            symbol = %symbol,
            ?granularity,
            rows_fetched = result.rows_fetched,
            partitions = result.partitions.len(),
            failures = result.failures.len(),
            "ingest finished"
        );
        Ok(result)
    }

    fn store_partition(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
        rows: &RecordBatch,
        options: &IngestOptions,
    ) -> Result<PartitionOutcome, WarehouseError> {
        let lease = self.locks.lease(symbol, granularity, partition);
        let _guard = lease.lock();

        let written_path =
            self.store
                .write(symbol, granularity, rows, partition, options.write_mode)?;
        let entry = self.register_partition(symbol, granularity, partition, options.source.clone())?;
        Ok(PartitionOutcome {
            partition_key: partition.to_owned(),
            written_path,
            rows_written: rows.len(),
            entry,
        })
    }

    /// Hash and describe every file of a partition and upsert its catalog
    /// entry under the canonical path. Callers hold the partition lock.
    fn register_partition(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
        source: Option<String>,
    ) -> Result<CatalogEntry, WarehouseError> {
        let files = self.store.partition_files(symbol, granularity, partition)?;
        let content_hash = layout::hash_partition(&files)?;

        let mut row_count = 0;
        let mut file_size_bytes = 0;
        let mut bounds: Option<(i64, i64)> = None;
        for path in &files {
            let info = self.store.file_info(path)?;
            row_count += info.row_count;
            file_size_bytes += info.byte_size;
            if let Some(range) = info.time_range {
                bounds = Some(match bounds {
                    Some((min, max)) => (min.min(range.start_us()), max.max(range.end_us())),
                    None => (range.start_us(), range.end_us()),
                });
            }
        }
        let time_range = bounds
            .map(|(min, max)| TimeRange::new(min, max))
            .transpose()?;

        self.catalog.register(&CatalogRegistration {
            symbol: symbol.clone(),
            granularity,
            partition_key: partition.to_owned(),
            file_path: self.store.partition_path(symbol, granularity, partition),
            storage_format: self.store.format(),
            row_count,
            time_range,
            data_source: source,
            content_hash,
            file_size_bytes,
        })
    }

    /// Merge a partition's files into one sorted, duplicate-free canonical
    /// file (last write wins) and re-register it.
    pub fn compact(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> Result<CompactResult, WarehouseError> {
        let _entered = self.span.enter();
        let lease = self.locks.lease(symbol, granularity, partition);
        let _guard = lease.lock();

        let kind = BatchKind::for_granularity(granularity);
        let files = self.store.partition_files(symbol, granularity, partition)?;
        if files.is_empty() {
            debug!(symbol = %symbol, partition, "nothing to compact");
            return Ok(CompactResult {
                files_merged: 0,
                rows_before: 0,
                rows_after: 0,
                duplicates_removed: 0,
                rewritten: false,
                content_hash: None,
                file_path: None,
            });
        }

        if let [single] = files.as_slice() {
            let stored = self.store.read_file(single, kind)?;
            if stored.is_sorted() && stored.duplicate_count() == 0 {
                debug!(symbol = %symbol, partition, "partition already compact");
                return Ok(CompactResult {
                    files_merged: 1,
                    rows_before: stored.len(),
                    rows_after: stored.len(),
                    duplicates_removed: 0,
                    rewritten: false,
                    content_hash: Some(layout::hash_partition(&files)?),
                    file_path: Some(single.clone()),
                });
            }
        }

        let merged = self
            .store
            .read(symbol, granularity, None, None, Some(partition))?;
        let rows_before = merged.len();
        let (compacted, duplicates_removed) = merged.dedup_keep_last();

        let source = self.existing_source(symbol, granularity, partition)?;
        let file_path = self.store.write(
            symbol,
            granularity,
            &compacted,
            partition,
            WriteMode::Overwrite,
        )?;
        let entry = self.register_partition(symbol, granularity, partition, source)?;

        info!(
            symbol = %symbol,
            partition,
            files_merged = files.len(),
            rows_before,
            rows_after = compacted.len(),
            duplicates_removed,
            "compacted partition"
        );
        Ok(CompactResult {
            files_merged: files.len(),
            rows_before,
            rows_after: compacted.len(),
            duplicates_removed,
            rewritten: true,
            content_hash: Some(entry.content_hash),
            file_path: Some(file_path),
        })
    }

    fn existing_source(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> Result<Option<String>, WarehouseError> {
        match self.catalog.get_metadata(symbol, granularity, partition) {
            Ok(entry) => Ok(entry.data_source),
            Err(WarehouseError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Delete the files and catalog entries of one partition, or of every
    /// partition of the dataset. Deleting absent data reports zero counts.
    pub fn delete(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: Option<&str>,
    ) -> Result<DeleteResult, WarehouseError> {
        let _entered = self.span.enter();
        let partitions: BTreeSet<String> = match partition {
            Some(partition) => BTreeSet::from([partition.to_owned()]),
            None => {
                let mut partitions: BTreeSet<String> = self
                    .store
                    .list_partitions(symbol, granularity)?
                    .into_iter()
                    .collect();
                let query = CatalogQuery::new().symbol(symbol).dataset(granularity);
                partitions.extend(
                    self.catalog
                        .query(&query)?
                        .into_iter()
                        .map(|entry| entry.partition_key),
                );
                partitions
            }
        };

        let mut result = DeleteResult::default();
        for partition in &partitions {
            let lease = self.locks.lease(symbol, granularity, partition);
            let _guard = lease.lock();
            result.files_deleted += self.store.delete(symbol, granularity, Some(partition))?;
            result.entries_deleted +=
                self.catalog
                    .delete_entries(symbol, granularity, Some(partition))?;
        }

        info!(
            symbol = %symbol,
            ?granularity,
            ?partition,
            files_deleted = result.files_deleted,
            entries_deleted = result.entries_deleted,
            "deleted data"
        );
        Ok(result)
    }

    /// Rows of every partition overlapping `range`, sorted by timestamp.
    pub fn read(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
    ) -> Result<RecordBatch, WarehouseError> {
        self.store.read(symbol, granularity, range, columns, None)
    }

    /// Recompute a partition's hash and compare it with the catalog.
    ///
    /// # Errors
    /// [`WarehouseError::NotFound`] if the partition is not catalogued or has
    /// no files, [`WarehouseError::Integrity`] if the hashes differ.
    pub fn verify_partition(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition: &str,
    ) -> Result<CatalogEntry, WarehouseError> {
        let entry = self.catalog.get_metadata(symbol, granularity, partition)?;
        let files = self.store.partition_files(symbol, granularity, partition)?;
        if files.is_empty() {
            return Err(WarehouseError::not_found(
                "partition file",
                entry.file_path.display().to_string(),
            ));
        }
        let actual = layout::hash_partition(&files)?;
        if actual != entry.content_hash {
            return Err(integrity_error(&entry.file_path, &entry.content_hash, actual));
        }
        Ok(entry)
    }
}

fn integrity_error(path: &Path, expected: &str, actual: String) -> WarehouseError {
    WarehouseError::Integrity {
        path: path.to_path_buf(),
        expected: expected.to_owned(),
        actual,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use ferrotick_core::{ContentHasher, PriceScale};
    use tempfile::tempdir;

    use super::*;
    use crate::store::test_batches::{hourly_bars, HOUR_US, JAN_1_2024};
    use crate::store::{BlockStore, ParquetStore};

    struct FixedProvider(RecordBatch);

    impl DataProvider for FixedProvider {
        fn fetch_bars(
            &self,
            _symbol: &Symbol,
            _granularity: Granularity,
            range: TimeRange,
        ) -> Result<RecordBatch, ProviderError> {
            Ok(self.0.filter_range(range))
        }

        fn fetch_ticks(&self, _symbol: &Symbol, range: TimeRange) -> Result<RecordBatch, ProviderError> {
            Ok(self.0.filter_range(range))
        }
    }

    struct FailingProvider;

    impl DataProvider for FailingProvider {
        fn fetch_bars(
            &self,
            _symbol: &Symbol,
            _granularity: Granularity,
            _range: TimeRange,
        ) -> Result<RecordBatch, ProviderError> {
            Err("upstream unavailable".into())
        }

        fn fetch_ticks(&self, _symbol: &Symbol, _range: TimeRange) -> Result<RecordBatch, ProviderError> {
            Err("upstream unavailable".into())
        }
    }

    fn managers(base: &Path) -> Vec<StorageManager> {
        let stores: Vec<Arc<dyn DataStore>> = vec![
            Arc::new(ParquetStore::parquet(base.join("pq"), PriceScale::default(), 64)),
            Arc::new(BlockStore::block(base.join("blk"), PriceScale::default(), 64)),
        ];
        stores
            .into_iter()
            .map(|store| {
                let db = MetadataDb::open_in_memory().expect("db");
                StorageManager::new(store, db, ValidationConfig::default())
            })
            .collect()
    }

    fn eurusd() -> Symbol {
        Symbol::parse("EURUSD").expect("symbol")
    }

    #[test]
    fn ingest_splits_by_year_and_registers_each_partition() {
        let temp = tempdir().expect("tempdir");
        let start = JAN_1_2024 - 5 * HOUR_US;
        let provider = FixedProvider(hourly_bars(start, 10));
        for manager in managers(temp.path()) {
            let result = manager
                .ingest(
                    &provider,
                    &eurusd(),
                    Some(Granularity::H1),
                    TimeRange::full(),
                    &IngestOptions::default(),
                )
                .expect("ingest");

            assert!(result.is_complete());
            assert_eq!(result.rows_fetched, 10);
            assert_eq!(result.rows_written(), 10);
            let keys: Vec<_> = result
                .partitions
                .iter()
                .map(|p| p.partition_key.as_str())
                .collect();
            assert_eq!(keys, vec!["2023", "2024"]);

            let entry = manager
                .catalog()
                .get_metadata(&eurusd(), Some(Granularity::H1), "2024")
                .expect("entry");
            assert_eq!(entry.row_count, 5);
            assert_eq!(entry.min_ts, Some(JAN_1_2024));
            assert_eq!(
                entry.content_hash,
                ContentHasher::hash_file(&entry.file_path).expect("hash")
            );
            manager
                .verify_partition(&eurusd(), Some(Granularity::H1), "2024")
                .expect("verified");
        }
    }

    #[test]
    fn empty_fetch_is_a_zero_result() {
        let temp = tempdir().expect("tempdir");
        let provider = FixedProvider(hourly_bars(JAN_1_2024, 3));
        let later = TimeRange::new(JAN_1_2024 + 100 * HOUR_US, JAN_1_2024 + 200 * HOUR_US)
            .expect("range");
        for manager in managers(temp.path()) {
            let result = manager
                .ingest(&provider, &eurusd(), Some(Granularity::H1), later, &IngestOptions::default())
                .expect("ingest");
            assert_eq!(result.rows_fetched, 0);
            assert!(result.partitions.is_empty());
            assert!(manager.catalog().list_all().expect("list").is_empty());
        }
    }

    #[test]
    fn provider_errors_are_passed_through() {
        let temp = tempdir().expect("tempdir");
        for manager in managers(temp.path()) {
            let error = manager
                .ingest(
                    &FailingProvider,
                    &eurusd(),
                    None,
                    TimeRange::full(),
                    &IngestOptions::default(),
                )
                .expect_err("provider failure");
            assert!(error.to_string().contains("upstream unavailable"));
        }
    }

    #[test]
    fn missing_required_columns_fail_before_writing() {
        let temp = tempdir().expect("tempdir");
        let bars = hourly_bars(JAN_1_2024, 4);
        let options = IngestOptions {
            required_columns: vec![Column::Open, Column::RealVolume],
            ..IngestOptions::default()
        };
        for manager in managers(temp.path()) {
            let provider = FixedProvider(bars.clone());
            let error = manager
                .ingest(&provider, &eurusd(), Some(Granularity::H1), TimeRange::full(), &options)
                .expect_err("schema");
            assert!(matches!(error, WarehouseError::Schema(_)));
            assert!(manager
                .store()
                .list_partitions(&eurusd(), Some(Granularity::H1))
                .expect("partitions")
                .is_empty());
        }
    }

    #[test]
    fn critical_issues_can_be_ingested_when_not_critical_only() {
        let temp = tempdir().expect("tempdir");
        let mut columns: BTreeMap<Column, Vec<f64>> = hourly_bars(JAN_1_2024, 4)
            .columns()
            .map(|(column, values)| (column, values.to_vec()))
            .collect();
        if let Some(low) = columns.get_mut(&Column::Low) {
            low[2] = 5.0;
        }
        let timestamps = hourly_bars(JAN_1_2024, 4).timestamps().to_vec();
        let broken = RecordBatch::new(BatchKind::Bars, timestamps, columns).expect("bars");
        let options = IngestOptions {
            critical_only: false,
            source: Some(String::from("replay")),
            ..IngestOptions::default()
        };
        for manager in managers(temp.path()) {
            let provider = FixedProvider(broken.clone());
            let result = manager
                .ingest(&provider, &eurusd(), Some(Granularity::H1), TimeRange::full(), &options)
                .expect("ingest");
            let report = result.report.expect("report");
            assert!(report.has_critical());
            assert_eq!(result.partitions[0].entry.data_source.as_deref(), Some("replay"));
        }
    }

    #[test]
    fn compaction_keeps_source_and_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let options = IngestOptions {
            source: Some(String::from("fake")),
            ..IngestOptions::default()
        };
        for manager in managers(temp.path()) {
            for start in [JAN_1_2024, JAN_1_2024 + 2 * HOUR_US] {
                let provider = FixedProvider(hourly_bars(start, 4));
                manager
                    .ingest(&provider, &eurusd(), Some(Granularity::H1), TimeRange::full(), &options)
                    .expect("ingest");
            }
            let before = manager
                .catalog()
                .get_metadata(&eurusd(), Some(Granularity::H1), "2024")
                .expect("entry");
            assert_eq!(before.row_count, 8);

            let first = manager
                .compact(&eurusd(), Some(Granularity::H1), "2024")
                .expect("compact");
            assert!(first.rewritten);
            assert_eq!(first.files_merged, 2);
            assert_eq!(first.duplicates_removed, 2);
            assert_eq!(first.rows_after, 6);

            let second = manager
                .compact(&eurusd(), Some(Granularity::H1), "2024")
                .expect("compact again");
            assert!(!second.rewritten);
            assert_eq!(second.content_hash, first.content_hash);
            assert_eq!(second.rows_after, first.rows_after);

            let entry = manager
                .catalog()
                .get_metadata(&eurusd(), Some(Granularity::H1), "2024")
                .expect("entry");
            assert_eq!(entry.row_count, 6);
            assert_eq!(entry.data_source.as_deref(), Some("fake"));
            assert_eq!(Some(entry.content_hash), first.content_hash);
        }
    }

    #[test]
    fn compacting_an_absent_partition_is_a_no_op() {
        let temp = tempdir().expect("tempdir");
        for manager in managers(temp.path()) {
            let result = manager
                .compact(&eurusd(), None, "2024-01")
                .expect("compact");
            assert_eq!(result.files_merged, 0);
            assert!(!result.rewritten);
        }
    }

    #[test]
    fn verify_partition_detects_changed_bytes() {
        let temp = tempdir().expect("tempdir");
        let provider = FixedProvider(hourly_bars(JAN_1_2024, 6));
        for manager in managers(temp.path()) {
            manager
                .ingest(
                    &provider,
                    &eurusd(),
                    Some(Granularity::H1),
                    TimeRange::full(),
                    &IngestOptions::default(),
                )
                .expect("ingest");
            let path = manager
                .catalog()
                .get_file_path(&eurusd(), Some(Granularity::H1), "2024")
                .expect("path");
            let mut bytes = fs::read(&path).expect("read");
            let middle = bytes.len() / 2;
            bytes[middle] ^= 0x01;
            fs::write(&path, bytes).expect("write");

            let error = manager
                .verify_partition(&eurusd(), Some(Granularity::H1), "2024")
                .expect_err("mismatch");
            assert!(matches!(error, WarehouseError::Integrity { .. }));
        }
    }

    #[test]
    fn delete_removes_files_and_entries_once() {
        let temp = tempdir().expect("tempdir");
        let provider = FixedProvider(hourly_bars(JAN_1_2024 - 2 * HOUR_US, 6));
        for manager in managers(temp.path()) {
            manager
                .ingest(
                    &provider,
                    &eurusd(),
                    Some(Granularity::H1),
                    TimeRange::full(),
                    &IngestOptions::default(),
                )
                .expect("ingest");

            let removed = manager
                .delete(&eurusd(), Some(Granularity::H1), None)
                .expect("delete");
            assert_eq!(
                removed,
                DeleteResult {
                    files_deleted: 2,
                    entries_deleted: 2
                }
            );
            let again = manager
                .delete(&eurusd(), Some(Granularity::H1), Some("2024"))
                .expect("delete again");
            assert_eq!(again, DeleteResult::default());
            assert!(manager
                .read(&eurusd(), Some(Granularity::H1), None, None)
                .expect("read")
                .is_empty());
        }
    }

    #[test]
    fn partition_locks_are_dropped_once_released() {
        let temp = tempdir().expect("tempdir");
        let provider = FixedProvider(hourly_bars(JAN_1_2024 - 2 * HOUR_US, 6));
        for manager in managers(temp.path()) {
            manager
                .ingest(
                    &provider,
                    &eurusd(),
                    Some(Granularity::H1),
                    TimeRange::full(),
                    &IngestOptions::default(),
                )
                .expect("ingest");
            manager
                .compact(&eurusd(), Some(Granularity::H1), "2024")
                .expect("compact");
            manager
                .delete(&eurusd(), Some(Granularity::H1), None)
                .expect("delete");
            assert_eq!(manager.locks.len(), 0);
        }
    }

    #[test]
    fn leases_on_one_partition_share_a_lock() {
        let locks = PartitionLocks::default();
        let first = locks.lease(&eurusd(), Some(Granularity::H1), "2024");
        let second = locks.lease(&eurusd(), Some(Granularity::H1), "2024");
        let other = locks.lease(&eurusd(), None, "2024-01");
        assert!(Arc::ptr_eq(&first.lock, &second.lock));
        assert!(!Arc::ptr_eq(&first.lock, &other.lock));
        assert_eq!(locks.len(), 2);

        drop(first);
        assert_eq!(locks.len(), 2);
        {
            let _guard = second.lock();
        }
        drop(second);
        drop(other);
        assert_eq!(locks.len(), 0);
    }
}
