//! Time-based partitioning of datasets.
//!
//! | Data | Key | Example |
//! |------|-----|---------|
//! | Ticks | `YYYY-MM` | `2024-01` |
//! | M1 .. H4 bars | `YYYY` | `2024` |
//! | D1, W1, MN1 bars | `all` | `all` |

use std::collections::BTreeMap;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::{Granularity, PartitionError, RecordBatch, TimeRange};

/// Single partition for daily-or-coarser bars.
pub const ALL_PARTITION: &str = "all";

/// Dataset directory name used for tick data.
pub const TICKS_DATASET: &str = "ticks";

/// Maps timestamps to partition keys and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionStrategy;

impl PartitionStrategy {
    /// Dataset name for a granularity: the granularity itself, or `ticks`.
    pub fn dataset(granularity: Option<Granularity>) -> &'static str {
        granularity.map_or(TICKS_DATASET, Granularity::as_str)
    }

    pub fn partition_key(
        granularity: Option<Granularity>,
        timestamp_us: i64,
    ) -> Result<String, PartitionError> {
        match granularity {
            Some(granularity) if !granularity.is_intraday() => Ok(ALL_PARTITION.to_owned()),
            Some(_) => {
                let date = calendar_date(timestamp_us)?;
                Ok(format!("{:04}", date.year()))
            }
            None => {
                let date = calendar_date(timestamp_us)?;
                Ok(format!("{:04}-{:02}", date.year(), u8::from(date.month())))
            }
        }
    }

    /// Inclusive window covered by `key`. `all` covers the full timeline.
    pub fn parse_partition_range(key: &str) -> Result<TimeRange, PartitionError> {
        if key == ALL_PARTITION {
            return Ok(TimeRange::full());
        }

        let invalid = || PartitionError::InvalidPartitionKey {
            key: key.to_owned(),
        };
        let (year, month) = match key.split_once('-') {
            Some((year, month)) => (year, Some(month)),
            None => (key, None),
        };
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;

        let (start, end) = match month {
            None => (
                month_start(year, Month::January).ok_or_else(invalid)?,
                month_start(year + 1, Month::January).ok_or_else(invalid)?,
            ),
            Some(month) => {
                if month.len() != 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let month: u8 = month.parse().map_err(|_| invalid())?;
                let month = Month::try_from(month).map_err(|_| invalid())?;
                let next_year = if month == Month::December { year + 1 } else { year };
                (
                    month_start(year, month).ok_or_else(invalid)?,
                    month_start(next_year, month.next()).ok_or_else(invalid)?,
                )
            }
        };

        TimeRange::new(start, end - 1).map_err(|_| invalid())
    }

    /// Split a batch into per-partition sub-batches, preserving row order
    /// within each partition.
    pub fn split(
        batch: &RecordBatch,
        granularity: Option<Granularity>,
    ) -> Result<BTreeMap<String, RecordBatch>, PartitionError> {
        let mut rows: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, ts) in batch.timestamps().iter().enumerate() {
            let key = Self::partition_key(granularity, *ts)?;
            rows.entry(key).or_default().push(index);
        }

        Ok(rows
            .into_iter()
            .map(|(key, indices)| (key, batch.take(&indices)))
            .collect())
    }
}

fn calendar_date(timestamp_us: i64) -> Result<Date, PartitionError> {
    let out_of_range = || PartitionError::TimestampOutOfRange { timestamp_us };
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_us) * 1_000)
        .map_err(|_| out_of_range())?;
    let date = datetime.date();
    if date.year() < 0 || date.year() > 9998 {
        return Err(out_of_range());
    }
    Ok(date)
}

fn month_start(year: i32, month: Month) -> Option<i64> {
    let date = Date::from_calendar_date(year, month, 1).ok()?;
    let start = PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc();
    i64::try_from(start.unix_timestamp_nanos() / 1_000).ok()
}
