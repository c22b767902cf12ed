//! Parquet files written and read through an in-memory `DuckDB`.

use std::collections::BTreeMap;
use std::path::Path;

use duckdb::types::Value as DuckValue;
use duckdb::{appender_params_from_iter, Connection, ToSql};
use ferrotick_core::{
    BatchKind, Column, ColumnKind, PriceScale, RecordBatch, TimeRange, TIMESTAMP_COLUMN,
};

use super::{fixed_price, FileInfo, PartitionCodec};
use crate::{StorageFormat, WarehouseError};

/// Prices are stored as `BIGINT` fixed-point, quantities as `DOUBLE`,
/// nulls as SQL `NULL`. The file carries no scale of its own, so readers
/// must use the scale it was written with.
#[derive(Debug, Clone, Copy)]
pub struct ParquetCodec {
    price_scale: PriceScale,
    row_group_size: usize,
}

impl ParquetCodec {
    pub fn new(price_scale: PriceScale, row_group_size: usize) -> Self {
        Self {
            price_scale,
            row_group_size: row_group_size.max(1),
        }
    }

    fn file_columns(connection: &Connection, source: &str) -> Result<Vec<String>, WarehouseError> {
        let sql = format!("DESCRIBE SELECT * FROM {source}");
        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement.query([])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get::<_, String>(0)?);
        }
        Ok(names)
    }

    /// Value columns of the file, in canonical order. Unknown columns are an
    /// error; the timestamp column must be present.
    fn value_columns(
        connection: &Connection,
        source: &str,
        path: &Path,
    ) -> Result<Vec<Column>, WarehouseError> {
        let names = Self::file_columns(connection, source)?;
        if !names.iter().any(|name| name == TIMESTAMP_COLUMN) {
            return Err(WarehouseError::corrupt(path, "missing timestamp column"));
        }
        let mut columns = names
            .iter()
            .filter(|name| name.as_str() != TIMESTAMP_COLUMN)
            .map(|name| {
                name.parse::<Column>()
                    .map_err(|error| WarehouseError::corrupt(path, error.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        columns.sort();
        Ok(columns)
    }
}

impl PartitionCodec for ParquetCodec {
    fn format(&self) -> StorageFormat {
        StorageFormat::Parquet
    }

    fn encode(&self, batch: &RecordBatch, path: &Path) -> Result<(), WarehouseError> {
        let connection = Connection::open_in_memory()?;
        let columns = batch.column_names();

        let mut ddl = format!("CREATE TABLE staging (\"{TIMESTAMP_COLUMN}\" BIGINT NOT NULL");
        for column in &columns {
            let sql_type = match column.kind() {
                ColumnKind::Price => "BIGINT",
                ColumnKind::Quantity => "DOUBLE",
            };
            ddl.push_str(&format!(", \"{column}\" {sql_type}"));
        }
        ddl.push(')');
        connection.execute_batch(ddl.as_str())?;

        {
            let mut appender = connection.appender("staging")?;
            let mut row = Vec::with_capacity(columns.len() + 1);
            for (index, ts) in batch.timestamps().iter().enumerate() {
                row.clear();
                row.push(DuckValue::BigInt(*ts));
                for column in &columns {
                    let value = batch.column(*column).map_or(f64::NAN, |values| values[index]);
                    row.push(match column.kind() {
                        ColumnKind::Price => fixed_price(self.price_scale, value)?
                            .map_or(DuckValue::Null, DuckValue::BigInt),
                        ColumnKind::Quantity if value.is_nan() => DuckValue::Null,
                        ColumnKind::Quantity => DuckValue::Double(value),
                    });
                }
                appender.append_row(appender_params_from_iter(row.iter()))?;
            }
        }

        let copy = format!(
            "COPY staging TO '{}' (FORMAT PARQUET, COMPRESSION ZSTD, ROW_GROUP_SIZE {})",
            escape_sql_string(path_to_sql(path).as_str()),
            self.row_group_size
        );
        connection.execute_batch(copy.as_str())?;
        Ok(())
    }

    fn decode(
        &self,
        path: &Path,
        kind: BatchKind,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
    ) -> Result<RecordBatch, WarehouseError> {
        let connection = Connection::open_in_memory()?;
        let escaped = escape_sql_string(path_to_sql(path).as_str());
        let available = Self::value_columns(
            &connection,
            format!("read_parquet('{escaped}')").as_str(),
            path,
        )?;
        let selected: Vec<Column> = match columns {
            Some(requested) => available
                .iter()
                .copied()
                .filter(|column| requested.contains(column))
                .collect(),
            None => available,
        };

        let mut sql = format!("SELECT \"{TIMESTAMP_COLUMN}\"");
        for column in &selected {
            sql.push_str(&format!(", \"{column}\""));
        }
        sql.push_str(&format!(
            " FROM read_parquet('{escaped}', file_row_number = true) \
             WHERE \"{TIMESTAMP_COLUMN}\" BETWEEN ? AND ? ORDER BY file_row_number"
        ));

        let range = range.unwrap_or_else(TimeRange::full);
        let (start, end) = (range.start_us(), range.end_us());
        let params: [&dyn ToSql; 2] = [&start, &end];

        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement.query(params.as_slice())?;
        let mut timestamps = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); selected.len()];
        while let Some(row) = rows.next()? {
            timestamps.push(row.get::<_, i64>(0)?);
            for (index, column) in selected.iter().enumerate() {
                let value = match column.kind() {
                    ColumnKind::Price => row
                        .get::<_, Option<i64>>(index + 1)?
                        .map_or(f64::NAN, |raw| self.price_scale.from_fixed(raw)),
                    ColumnKind::Quantity => {
                        row.get::<_, Option<f64>>(index + 1)?.unwrap_or(f64::NAN)
                    }
                };
                values[index].push(value);
            }
        }

        let columns: BTreeMap<Column, Vec<f64>> = selected.into_iter().zip(values).collect();
        RecordBatch::new(kind, timestamps, columns)
            .map_err(|error| WarehouseError::corrupt(path, error.to_string()))
    }

    fn describe(&self, path: &Path) -> Result<FileInfo, WarehouseError> {
        let connection = Connection::open_in_memory()?;
        let source = format!(
            "read_parquet('{}')",
            escape_sql_string(path_to_sql(path).as_str())
        );
        let columns = Self::value_columns(&connection, source.as_str(), path)?;

        let sql = format!(
            "SELECT COUNT(*), MIN(\"{TIMESTAMP_COLUMN}\"), MAX(\"{TIMESTAMP_COLUMN}\") FROM {source}"
        );
        let (row_count, min_ts, max_ts): (i64, Option<i64>, Option<i64>) =
            connection.query_row(sql.as_str(), [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        let time_range = match (min_ts, max_ts) {
            (Some(min), Some(max)) => Some(
                TimeRange::new(min, max)
                    .map_err(|error| WarehouseError::corrupt(path, error.to_string()))?,
            ),
            _ => None,
        };
        Ok(FileInfo {
            row_count: u64::try_from(row_count).unwrap_or_default(),
            byte_size: 0,
            time_range,
            columns,
        })
    }
}

/// Convert a path to a SQL-compatible string (forward slashes).
fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Escape a string for inclusion in a SQL literal. Only used for file paths
/// produced by the store layout.
fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
