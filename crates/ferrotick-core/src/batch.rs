//! Columnar in-memory record batches.
//!
//! A [`RecordBatch`] holds one timestamp vector plus any number of value
//! columns keyed by [`Column`]. Missing values are `NaN`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Bar, CoreError, Granularity, SchemaError, Symbol, Tick, TimeRange};

/// Name of the mandatory timestamp column in every persisted format.
pub const TIMESTAMP_COLUMN: &str = "timestamp_us";

/// Whether a batch carries ticks or bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Ticks,
    Bars,
}

impl BatchKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticks => "ticks",
            Self::Bars => "bars",
        }
    }

    pub const fn for_granularity(granularity: Option<Granularity>) -> Self {
        match granularity {
            Some(_) => Self::Bars,
            None => Self::Ticks,
        }
    }

    /// Columns every stored batch of this kind must carry.
    pub const fn mandatory_columns(self) -> &'static [Column] {
        match self {
            Self::Ticks => &[Column::Bid, Column::Ask],
            Self::Bars => &[Column::Open, Column::High, Column::Low, Column::Close],
        }
    }

    /// Every column a batch of this kind may carry.
    pub const fn allowed_columns(self) -> &'static [Column] {
        match self {
            Self::Ticks => &[
                Column::Bid,
                Column::Ask,
                Column::BidVolume,
                Column::AskVolume,
            ],
            Self::Bars => &[
                Column::Open,
                Column::High,
                Column::Low,
                Column::Close,
                Column::TickVolume,
                Column::RealVolume,
                Column::Spread,
            ],
        }
    }

    pub fn allows(self, column: Column) -> bool {
        self.allowed_columns().contains(&column)
    }

    /// Column used alongside timestamps by the content hash.
    pub const fn signature_column(self) -> Column {
        match self {
            Self::Ticks => Column::Ask,
            Self::Bars => Column::Close,
        }
    }
}

impl Display for BatchKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a column is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Scaled fixed-point integer on disk.
    Price,
    /// IEEE double on disk.
    Quantity,
}

/// Value columns of tick and bar batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    TickVolume,
    RealVolume,
    Spread,
    Bid,
    Ask,
    BidVolume,
    AskVolume,
}

impl Column {
    pub const ALL: [Self; 11] = [
        Self::Open,
        Self::High,
        Self::Low,
        Self::Close,
        Self::TickVolume,
        Self::RealVolume,
        Self::Spread,
        Self::Bid,
        Self::Ask,
        Self::BidVolume,
        Self::AskVolume,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::TickVolume => "tick_volume",
            Self::RealVolume => "real_volume",
            Self::Spread => "spread",
            Self::Bid => "bid",
            Self::Ask => "ask",
            Self::BidVolume => "bid_volume",
            Self::AskVolume => "ask_volume",
        }
    }

    pub const fn kind(self) -> ColumnKind {
        match self {
            Self::Open | Self::High | Self::Low | Self::Close | Self::Bid | Self::Ask => {
                ColumnKind::Price
            }
            Self::TickVolume
            | Self::RealVolume
            | Self::Spread
            | Self::BidVolume
            | Self::AskVolume => ColumnKind::Quantity,
        }
    }

    pub const fn is_volume(self) -> bool {
        matches!(
            self,
            Self::TickVolume | Self::RealVolume | Self::BidVolume | Self::AskVolume
        )
    }

    /// Stable one-byte identifier used by binary formats.
    pub const fn id(self) -> u8 {
        match self {
            Self::Open => 1,
            Self::High => 2,
            Self::Low => 3,
            Self::Close => 4,
            Self::TickVolume => 5,
            Self::RealVolume => 6,
            Self::Spread => 7,
            Self::Bid => 8,
            Self::Ask => 9,
            Self::BidVolume => 10,
            Self::AskVolume => 11,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.id() == id)
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|column| column.as_str() == normalized)
            .ok_or_else(|| SchemaError::UnknownColumn {
                name: value.to_owned(),
            })
    }
}

/// Columnar batch of ticks or bars for a single symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    kind: BatchKind,
    timestamps: Vec<i64>,
    columns: BTreeMap<Column, Vec<f64>>,
}

impl RecordBatch {
    /// Build a batch, checking that every column belongs to `kind` and has one
    /// value per timestamp. Mandatory columns are not required here so that
    /// projected reads can be represented.
    pub fn new(
        kind: BatchKind,
        timestamps: Vec<i64>,
        columns: BTreeMap<Column, Vec<f64>>,
    ) -> Result<Self, SchemaError> {
        for (column, values) in &columns {
            if !kind.allows(*column) {
                return Err(SchemaError::ForeignColumn {
                    column: column.to_string(),
                    kind: kind.to_string(),
                });
            }
            if values.len() != timestamps.len() {
                return Err(SchemaError::LengthMismatch {
                    column: column.to_string(),
                    expected: timestamps.len(),
                    actual: values.len(),
                });
            }
        }

        Ok(Self {
            kind,
            timestamps,
            columns,
        })
    }

    /// Empty batch carrying all columns of `kind`.
    pub fn empty(kind: BatchKind) -> Self {
        Self {
            kind,
            timestamps: Vec::new(),
            columns: kind
                .allowed_columns()
                .iter()
                .map(|column| (*column, Vec::new()))
                .collect(),
        }
    }

    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut columns = BTreeMap::new();
        let getters: [(Column, fn(&Bar) -> f64); 7] = [
            (Column::Open, Bar::open),
            (Column::High, Bar::high),
            (Column::Low, Bar::low),
            (Column::Close, Bar::close),
            (Column::TickVolume, Bar::tick_volume),
            (Column::RealVolume, Bar::real_volume),
            (Column::Spread, Bar::spread),
        ];
        for (column, getter) in getters {
            columns.insert(column, bars.iter().map(getter).collect());
        }

        Self {
            kind: BatchKind::Bars,
            timestamps: bars.iter().map(Bar::timestamp_us).collect(),
            columns,
        }
    }

    pub fn from_ticks(ticks: &[Tick]) -> Self {
        let mut columns = BTreeMap::new();
        let getters: [(Column, fn(&Tick) -> f64); 4] = [
            (Column::Bid, Tick::bid),
            (Column::Ask, Tick::ask),
            (Column::BidVolume, Tick::bid_volume),
            (Column::AskVolume, Tick::ask_volume),
        ];
        for (column, getter) in getters {
            columns.insert(column, ticks.iter().map(getter).collect());
        }

        Self {
            kind: BatchKind::Ticks,
            timestamps: ticks.iter().map(Tick::timestamp_us).collect(),
            columns,
        }
    }

    /// Materialize validated bars. Missing or null volume columns become zero.
    pub fn to_bars(&self, symbol: &Symbol, granularity: Granularity) -> Result<Vec<Bar>, CoreError> {
        self.expect_kind(BatchKind::Bars)?;
        self.require_columns(BatchKind::Bars.mandatory_columns())?;

        (0..self.len())
            .map(|row| {
                Bar::new(
                    symbol.clone(),
                    granularity,
                    self.timestamps[row],
                    self.value(Column::Open, row),
                    self.value(Column::High, row),
                    self.value(Column::Low, row),
                    self.value(Column::Close, row),
                    self.value_or_zero(Column::TickVolume, row),
                    self.value_or_zero(Column::RealVolume, row),
                    self.value_or_zero(Column::Spread, row),
                )
                .map_err(CoreError::from)
            })
            .collect()
    }

    pub fn to_ticks(&self, symbol: &Symbol) -> Result<Vec<Tick>, CoreError> {
        self.expect_kind(BatchKind::Ticks)?;
        self.require_columns(BatchKind::Ticks.mandatory_columns())?;

        (0..self.len())
            .map(|row| {
                Tick::new(
                    symbol.clone(),
                    self.timestamps[row],
                    self.value(Column::Bid, row),
                    self.value(Column::Ask, row),
                    self.value_or_zero(Column::BidVolume, row),
                    self.value_or_zero(Column::AskVolume, row),
                )
                .map_err(CoreError::from)
            })
            .collect()
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn column(&self, column: Column) -> Option<&[f64]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// Present value columns in canonical order.
    pub fn column_names(&self) -> Vec<Column> {
        self.columns.keys().copied().collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (Column, &[f64])> {
        self.columns
            .iter()
            .map(|(column, values)| (*column, values.as_slice()))
    }

    pub fn min_timestamp(&self) -> Option<i64> {
        self.timestamps.iter().copied().min()
    }

    pub fn max_timestamp(&self) -> Option<i64> {
        self.timestamps.iter().copied().max()
    }

    pub fn require_columns(&self, required: &[Column]) -> Result<(), SchemaError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !self.columns.contains_key(column))
            .map(ToString::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::MissingColumns { columns: missing })
        }
    }

    pub fn expect_kind(&self, expected: BatchKind) -> Result<(), SchemaError> {
        if self.kind != expected {
            return Err(SchemaError::KindMismatch {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            });
        }
        Ok(())
    }

    /// Rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            kind: self.kind,
            timestamps: indices.iter().map(|&index| self.timestamps[index]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(column, values)| {
                    (*column, indices.iter().map(|&index| values[index]).collect())
                })
                .collect(),
        }
    }

    pub fn filter_range(&self, range: TimeRange) -> Self {
        let indices: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(_, ts)| range.contains(**ts))
            .map(|(index, _)| index)
            .collect();
        self.take(&indices)
    }

    /// Project onto `columns`. Requesting an absent column is a schema error.
    pub fn select(&self, columns: &[Column]) -> Result<Self, SchemaError> {
        self.require_columns(columns)?;
        Ok(Self {
            kind: self.kind,
            timestamps: self.timestamps.clone(),
            columns: self
                .columns
                .iter()
                .filter(|(column, _)| columns.contains(column))
                .map(|(column, values)| (*column, values.clone()))
                .collect(),
        })
    }

    pub fn is_sorted(&self) -> bool {
        self.timestamps.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Stable sort by timestamp: rows sharing a timestamp keep their order.
    pub fn sorted_by_timestamp(&self) -> Self {
        if self.is_sorted() {
            return self.clone();
        }
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by_key(|&index| self.timestamps[index]);
        self.take(&indices)
    }

    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashMap::with_capacity(self.len());
        for ts in &self.timestamps {
            *seen.entry(*ts).or_insert(0_usize) += 1;
        }
        seen.values().map(|count| count - 1).sum()
    }

    /// Sort by timestamp and keep the last row of each timestamp.
    /// Returns the deduplicated batch and the number of rows dropped.
    pub fn dedup_keep_last(&self) -> (Self, usize) {
        let sorted = self.sorted_by_timestamp();
        let keep: Vec<usize> = (0..sorted.len())
            .filter(|&index| {
                index + 1 == sorted.len() || sorted.timestamps[index] != sorted.timestamps[index + 1]
            })
            .collect();
        let removed = sorted.len() - keep.len();
        if removed == 0 {
            return (sorted, 0);
        }
        (sorted.take(&keep), removed)
    }

    /// Append batches of the same kind. Columns absent from some inputs are
    /// filled with `NaN` for those rows.
    pub fn concat(batches: &[Self]) -> Result<Self, SchemaError> {
        let Some(first) = batches.first() else {
            return Err(SchemaError::EmptyBatch);
        };
        let kind = first.kind;
        let mut all_columns: Vec<Column> = Vec::new();
        for batch in batches {
            batch.expect_kind(kind)?;
            for column in batch.columns.keys() {
                if !all_columns.contains(column) {
                    all_columns.push(*column);
                }
            }
        }

        let total: usize = batches.iter().map(Self::len).sum();
        let mut timestamps = Vec::with_capacity(total);
        let mut columns: BTreeMap<Column, Vec<f64>> = all_columns
            .iter()
            .map(|column| (*column, Vec::with_capacity(total)))
            .collect();

        for batch in batches {
            timestamps.extend_from_slice(&batch.timestamps);
            for (column, values) in &mut columns {
                match batch.columns.get(column) {
                    Some(source) => values.extend_from_slice(source),
                    None => values.extend(std::iter::repeat(f64::NAN).take(batch.len())),
                }
            }
        }

        Ok(Self {
            kind,
            timestamps,
            columns,
        })
    }

    /// Logical equality: same kind, timestamps, and column values, where two
    /// nulls compare equal.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.timestamps == other.timestamps
            && self.columns.len() == other.columns.len()
            && self.columns.iter().all(|(column, values)| {
                other.columns.get(column).is_some_and(|theirs| {
                    values.len() == theirs.len()
                        && values
                            .iter()
                            .zip(theirs)
                            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
                })
            })
    }

    pub(crate) fn value(&self, column: Column, row: usize) -> f64 {
        self.columns
            .get(&column)
            .map_or(f64::NAN, |values| values[row])
    }

    fn value_or_zero(&self, column: Column, row: usize) -> f64 {
        let value = self.value(column, row);
        if value.is_nan() {
            0.0
        } else {
            value
        }
    }

    /// Replace or insert a column. Used by transforms that rebuild values.
    pub(crate) fn with_column(mut self, column: Column, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.timestamps.len());
        self.columns.insert(column, values);
        self
    }
}
