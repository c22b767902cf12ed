//! Shared fixtures for the warehouse behavior suites.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use ferrotick_core::{BatchKind, Column, Granularity, RecordBatch, Symbol, TimeRange};
use ferrotick_warehouse::{
    DataProvider, ProviderError, StorageFormat, StorageManager, WarehouseConfig,
};

pub const JAN_1_2024: i64 = 1_704_067_200_000_000;
pub const FEB_1_2024: i64 = 1_706_745_600_000_000;
pub const HOUR_US: i64 = 3_600_000_000;
pub const MINUTE_US: i64 = 60_000_000;

/// Serves fixed batches, filtered to the requested range.
pub struct ReplayProvider {
    bars: RecordBatch,
    ticks: RecordBatch,
}

impl ReplayProvider {
    pub fn bars(bars: RecordBatch) -> Self {
        Self {
            bars,
            ticks: RecordBatch::empty(BatchKind::Ticks),
        }
    }

    pub fn ticks(ticks: RecordBatch) -> Self {
        Self {
            bars: RecordBatch::empty(BatchKind::Bars),
            ticks,
        }
    }
}

impl DataProvider for ReplayProvider {
    fn fetch_bars(
        &self,
        _symbol: &Symbol,
        _granularity: Granularity,
        range: TimeRange,
    ) -> Result<RecordBatch, ProviderError> {
        Ok(self.bars.filter_range(range))
    }

    fn fetch_ticks(&self, _symbol: &Symbol, range: TimeRange) -> Result<RecordBatch, ProviderError> {
        Ok(self.ticks.filter_range(range))
    }
}

pub fn eurusd() -> Symbol {
    Symbol::parse("EURUSD").expect("symbol")
}

pub fn manager(home: &Path, format: StorageFormat) -> StorageManager {
    let config = WarehouseConfig::with_home(home).storage_format(format);
    StorageManager::open(&config).expect("storage manager")
}

/// Clean hourly bars around 1.10: `open == close`, high and low half a pip
/// either side, constant tick volume.
pub fn hourly_bars(start: i64, count: usize) -> RecordBatch {
    hourly_bars_offset(start, count, 0)
}

/// Like [`hourly_bars`] with the price pattern shifted by `offset`, so two
/// batches covering the same hours carry different prices.
pub fn hourly_bars_offset(start: i64, count: usize, offset: usize) -> RecordBatch {
    let timestamps: Vec<i64> = (0..count as i64).map(|i| start + i * HOUR_US).collect();
    let close: Vec<f64> = (0..count)
        .map(|i| 1.1 + ((i + offset) % 5) as f64 * 0.000_123)
        .collect();
    let mut columns = BTreeMap::new();
    columns.insert(Column::Open, close.clone());
    columns.insert(Column::High, close.iter().map(|c| c + 0.0005).collect());
    columns.insert(Column::Low, close.iter().map(|c| c - 0.0005).collect());
    columns.insert(Column::Close, close);
    columns.insert(Column::TickVolume, vec![25.0; count]);
    RecordBatch::new(BatchKind::Bars, timestamps, columns).expect("bars")
}

/// Ticks every `step_us` with a one-pip spread.
pub fn ticks(start: i64, count: usize, step_us: i64) -> RecordBatch {
    let timestamps: Vec<i64> = (0..count as i64).map(|i| start + i * step_us).collect();
    let bid: Vec<f64> = (0..count).map(|i| 1.1 + (i % 3) as f64 * 0.000_01).collect();
    let mut columns = BTreeMap::new();
    columns.insert(Column::Ask, bid.iter().map(|b| b + 0.0001).collect());
    columns.insert(Column::Bid, bid);
    RecordBatch::new(BatchKind::Ticks, timestamps, columns).expect("ticks")
}
