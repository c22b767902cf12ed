//! Metadata index from logical partitions to physical files.
//!
//! Each row maps `(symbol, dataset, partition_key)` to one canonical file
//! path. Registration is an upsert keyed by `file_path`; the logical key has
//! its own unique index, so two paths can never claim the same partition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use duckdb::{Connection, Row, ToSql};
use ferrotick_core::{Granularity, PartitionStrategy, Symbol, TimeRange, UtcDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Span};

use crate::{MetadataDb, StorageFormat, WarehouseError};

const ENTRY_COLUMNS: &str = "id, symbol, granularity, partition_key, file_path, storage_format, \
     row_count, min_ts, max_ts, data_source, content_hash, file_size_bytes, created_at, updated_at";

/// Everything the catalog needs to record a written partition.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRegistration {
    pub symbol: Symbol,
    pub granularity: Option<Granularity>,
    pub partition_key: String,
    pub file_path: PathBuf,
    pub storage_format: StorageFormat,
    pub row_count: u64,
    /// `None` when the partition holds no rows.
    pub time_range: Option<TimeRange>,
    pub data_source: Option<String>,
    pub content_hash: String,
    pub file_size_bytes: u64,
}

/// A registered partition. `granularity` is `None` for tick data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub symbol: Symbol,
    pub granularity: Option<Granularity>,
    pub partition_key: String,
    pub file_path: PathBuf,
    pub storage_format: StorageFormat,
    pub row_count: u64,
    pub min_ts: Option<i64>,
    pub max_ts: Option<i64>,
    pub data_source: Option<String>,
    pub content_hash: String,
    pub file_size_bytes: u64,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

impl CatalogEntry {
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.min_ts, self.max_ts) {
            (Some(min), Some(max)) => TimeRange::new(min, max).ok(),
            _ => None,
        }
    }
}

/// Filters for [`DataCatalog::query`]; unset filters match everything and
/// set ones are combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    symbol: Option<Symbol>,
    dataset: Option<Option<Granularity>>,
    time_range: Option<TimeRange>,
    format: Option<StorageFormat>,
}

impl CatalogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: &Symbol) -> Self {
        self.symbol = Some(symbol.clone());
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.dataset = Some(Some(granularity));
        self
    }

    pub fn ticks(mut self) -> Self {
        self.dataset = Some(None);
        self
    }

    /// Bars of `granularity`, or ticks for `None`.
    pub fn dataset(mut self, granularity: Option<Granularity>) -> Self {
        self.dataset = Some(granularity);
        self
    }

    /// Entries whose `[min_ts, max_ts]` overlaps `range`.
    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn format(mut self, format: StorageFormat) -> Self {
        self.format = Some(format);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_entries: u64,
    pub total_symbols: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub by_format: BTreeMap<String, u64>,
    /// Entries without a source are counted under `unknown`.
    pub by_source: BTreeMap<String, u64>,
}

/// Transactional catalog backed by the shared [`MetadataDb`].
#[derive(Clone)]
pub struct DataCatalog {
    db: MetadataDb,
    span: Span,
}

impl DataCatalog {
    pub fn new(db: MetadataDb) -> Self {
        Self {
            db,
            span: info_span!("catalog"),
        }
    }

    pub fn in_span(db: MetadataDb, parent: &Span) -> Self {
        Self {
            db,
            span: info_span!(parent: parent, "catalog"),
        }
    }

    /// Insert or update the entry for `registration.file_path`. An update
    /// keeps the original `id`, `created_at` and logical key; the path
    /// already determines the partition.
    ///
    /// # Errors
    /// Fails if another path is already registered for the same
    /// `(symbol, granularity, partition_key)`, or on any database error. The
    /// transaction is rolled back in both cases.
    pub fn register(
        &self,
        registration: &CatalogRegistration,
    ) -> Result<CatalogEntry, WarehouseError> {
        let _entered = self.span.enter();
        let path = path_text(&registration.file_path);
        let symbol = registration.symbol.as_str();
        let granularity = registration.granularity.map(Granularity::as_str);
        let dataset = PartitionStrategy::dataset(registration.granularity);
        let format = registration.storage_format.as_str();
        let row_count = to_sql_count(registration.row_count);
        let file_size = to_sql_count(registration.file_size_bytes);
        let min_ts = registration.time_range.map(TimeRange::start_us);
        let max_ts = registration.time_range.map(TimeRange::end_us);
        let now = UtcDateTime::now().unix_micros();

        let entry = self.db.transaction(|connection| {
            let existing: i64 = connection.query_row(
                "SELECT COUNT(*) FROM catalog WHERE file_path = ?",
                [path.as_str()],
                |row| row.get(0),
            )?;

            if existing > 0 {
                let params: [&dyn ToSql; 9] = [
                    &format,
                    &row_count,
                    &min_ts,
                    &max_ts,
                    &registration.data_source,
                    &registration.content_hash,
                    &file_size,
                    &now,
                    &path,
                ];
                connection.execute(
                    "UPDATE catalog SET storage_format = ?, row_count = ?, min_ts = ?, \
                     max_ts = ?, data_source = ?, content_hash = ?, file_size_bytes = ?, \
                     updated_at = ? WHERE file_path = ?",
                    params.as_slice(),
                )?;
            } else {
                let params: [&dyn ToSql; 14] = [
                    &symbol,
                    &granularity,
                    &dataset,
                    &registration.partition_key,
                    &path,
                    &format,
                    &row_count,
                    &min_ts,
                    &max_ts,
                    &registration.data_source,
                    &registration.content_hash,
                    &file_size,
                    &now,
                    &now,
                ];
                connection.execute(
                    "INSERT INTO catalog (symbol, granularity, dataset, partition_key, \
                     file_path, storage_format, row_count, min_ts, max_ts, data_source, \
                     content_hash, file_size_bytes, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }

            let params: [&dyn ToSql; 1] = [&path];
            select_one(connection, "file_path = ?", params.as_slice())?
                .ok_or_else(|| WarehouseError::not_found("catalog entry", path.clone()))
        })?;

        debug!(
            symbol = %entry.symbol,
            partition = %entry.partition_key,
            rows = entry.row_count,
            hash = %entry.content_hash,
            "registered catalog entry"
        );
        Ok(entry)
    }

    /// Entries matching every filter set on `query`, ordered by symbol,
    /// dataset and partition.
    pub fn query(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, WarehouseError> {
        let symbol = query.symbol.as_ref().map(Symbol::as_str);
        let dataset = query.dataset.map(PartitionStrategy::dataset);
        let format = query.format.map(StorageFormat::as_str);
        let start = query.time_range.map(TimeRange::start_us);
        let end = query.time_range.map(TimeRange::end_us);

        let mut clauses = Vec::new();
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(symbol) = &symbol {
            clauses.push("symbol = ?");
            params.push(symbol);
        }
        if let Some(dataset) = &dataset {
            clauses.push("dataset = ?");
            params.push(dataset);
        }
        if let (Some(start), Some(end)) = (&start, &end) {
            clauses.push("min_ts <= ? AND max_ts >= ?");
            params.push(end);
            params.push(start);
        }
        if let Some(format) = &format {
            clauses.push("storage_format = ?");
            params.push(format);
        }

        let filter = if clauses.is_empty() {
            String::from("TRUE")
        } else {
            clauses.join(" AND ")
        };
        let connection = self.db.acquire()?;
        select_many(&connection, &filter, &params)
    }

    pub fn list_all(&self) -> Result<Vec<CatalogEntry>, WarehouseError> {
        self.query(&CatalogQuery::new())
    }

    /// The entry for one partition.
    ///
    /// # Errors
    /// [`WarehouseError::NotFound`] if the partition is not registered.
    pub fn get_metadata(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition_key: &str,
    ) -> Result<CatalogEntry, WarehouseError> {
        let symbol_text = symbol.as_str();
        let dataset = PartitionStrategy::dataset(granularity);
        let params: [&dyn ToSql; 3] = [&symbol_text, &dataset, &partition_key];
        let connection = self.db.acquire()?;
        let entry = select_one(
            &connection,
            "symbol = ? AND dataset = ? AND partition_key = ?",
            params.as_slice(),
        )?;
        entry.ok_or_else(|| {
            WarehouseError::not_found(
                "catalog entry",
                format!("{symbol}/{dataset}/{partition_key}"),
            )
        })
    }

    pub fn get_file_path(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition_key: &str,
    ) -> Result<PathBuf, WarehouseError> {
        Ok(self
            .get_metadata(symbol, granularity, partition_key)?
            .file_path)
    }

    /// The entry registered for `path`, if any.
    pub fn get_by_path(&self, path: &Path) -> Result<Option<CatalogEntry>, WarehouseError> {
        let path = path_text(path);
        let params: [&dyn ToSql; 1] = [&path];
        let connection = self.db.acquire()?;
        let entry = select_one(&connection, "file_path = ?", params.as_slice())?;
        Ok(entry)
    }

    /// Remove the row for `path`. The file itself is left alone. Returns
    /// whether a row was removed.
    pub fn delete_entry(&self, path: &Path) -> Result<bool, WarehouseError> {
        let _entered = self.span.enter();
        let path = path_text(path);
        let removed = self.db.transaction(|connection| {
            Ok(connection.execute("DELETE FROM catalog WHERE file_path = ?", [path.as_str()])?)
        })?;
        debug!(path = %path, removed, "deleted catalog entry");
        Ok(removed > 0)
    }

    /// Remove the rows of one partition, or of the whole dataset when
    /// `partition_key` is `None`. Returns the number of rows removed.
    pub fn delete_entries(
        &self,
        symbol: &Symbol,
        granularity: Option<Granularity>,
        partition_key: Option<&str>,
    ) -> Result<usize, WarehouseError> {
        let _entered = self.span.enter();
        let symbol_text = symbol.as_str();
        let dataset = PartitionStrategy::dataset(granularity);
        let removed = self.db.transaction(|connection| {
            let removed = match partition_key {
                Some(partition) => {
                    let params: [&dyn ToSql; 3] = [&symbol_text, &dataset, &partition];
                    connection.execute(
                        "DELETE FROM catalog WHERE symbol = ? AND dataset = ? AND partition_key = ?",
                        params.as_slice(),
                    )?
                }
                None => {
                    let params: [&dyn ToSql; 2] = [&symbol_text, &dataset];
                    connection.execute(
                        "DELETE FROM catalog WHERE symbol = ? AND dataset = ?",
                        params.as_slice(),
                    )?
                }
            };
            Ok(removed)
        })?;
        debug!(symbol = %symbol, dataset, ?partition_key, removed, "deleted catalog entries");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CatalogStats, WarehouseError> {
        let connection = self.db.acquire()?;
        let (total_entries, total_symbols, total_rows, total_bytes): (i64, i64, i64, i64) =
            connection.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT symbol), \
                 CAST(COALESCE(SUM(row_count), 0) AS BIGINT), \
                 CAST(COALESCE(SUM(file_size_bytes), 0) AS BIGINT) FROM catalog",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(CatalogStats {
            total_entries: from_sql_count(total_entries),
            total_symbols: from_sql_count(total_symbols),
            total_rows: from_sql_count(total_rows),
            total_bytes: from_sql_count(total_bytes),
            by_format: group_counts(&connection, "storage_format")?,
            by_source: group_counts(&connection, "COALESCE(data_source, 'unknown')")?,
        })
    }
}

fn group_counts(
    connection: &Connection,
    expression: &str,
) -> Result<BTreeMap<String, u64>, WarehouseError> {
    let sql = format!("SELECT {expression} AS name, COUNT(*) FROM catalog GROUP BY name");
    let mut statement = connection.prepare(sql.as_str())?;
    let mut rows = statement.query([])?;
    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        counts.insert(name, from_sql_count(count));
    }
    Ok(counts)
}

fn select_one(
    connection: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
) -> Result<Option<CatalogEntry>, WarehouseError> {
    Ok(select_many(connection, filter, params)?.into_iter().next())
}

fn select_many(
    connection: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<CatalogEntry>, WarehouseError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM catalog WHERE {filter} \
         ORDER BY symbol, dataset, partition_key, file_path"
    );
    let mut statement = connection.prepare(sql.as_str())?;
    let mut rows = statement.query(params)?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(RawEntry::read(row)?.into_entry()?);
    }
    Ok(entries)
}

/// Catalog row as stored, before parsing into domain types.
struct RawEntry {
    id: i64,
    symbol: String,
    granularity: Option<String>,
    partition_key: String,
    file_path: String,
    storage_format: String,
    row_count: i64,
    min_ts: Option<i64>,
    max_ts: Option<i64>,
    data_source: Option<String>,
    content_hash: String,
    file_size_bytes: i64,
    created_at: i64,
    updated_at: i64,
}

impl RawEntry {
    fn read(row: &Row<'_>) -> Result<Self, duckdb::Error> {
        Ok(Self {
            id: row.get(0)?,
            symbol: row.get(1)?,
            granularity: row.get(2)?,
            partition_key: row.get(3)?,
            file_path: row.get(4)?,
            storage_format: row.get(5)?,
            row_count: row.get(6)?,
            min_ts: row.get(7)?,
            max_ts: row.get(8)?,
            data_source: row.get(9)?,
            content_hash: row.get(10)?,
            file_size_bytes: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry, WarehouseError> {
        let granularity = self
            .granularity
            .as_deref()
            .map(str::parse::<Granularity>)
            .transpose()?;
        Ok(CatalogEntry {
            id: self.id,
            symbol: Symbol::parse(&self.symbol)?,
            granularity,
            partition_key: self.partition_key,
            file_path: PathBuf::from(self.file_path),
            storage_format: self.storage_format.parse()?,
            row_count: from_sql_count(self.row_count),
            min_ts: self.min_ts,
            max_ts: self.max_ts,
            data_source: self.data_source,
            content_hash: self.content_hash,
            file_size_bytes: from_sql_count(self.file_size_bytes),
            created_at: UtcDateTime::from_unix_micros(self.created_at)?,
            updated_at: UtcDateTime::from_unix_micros(self.updated_at)?,
        })
    }
}

pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
