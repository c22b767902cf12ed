use std::collections::BTreeMap;

use crate::{BatchKind, Column, RecordBatch};

pub(crate) const JAN_1_2024: i64 = 1_704_067_200_000_000;
pub(crate) const HOUR_US: i64 = 3_600_000_000;

/// Well-formed hourly bars around 1.10 with a small deterministic wiggle.
pub(crate) fn hourly_bars(count: usize) -> RecordBatch {
    let timestamps: Vec<i64> = (0..count as i64).map(|i| JAN_1_2024 + i * HOUR_US).collect();
    let close: Vec<f64> = (0..count)
        .map(|i| 1.10 + ((i % 7) as f64 - 3.0) * 0.0002)
        .collect();
    let open: Vec<f64> = (0..count)
        .map(|i| if i == 0 { close[0] } else { close[i - 1] })
        .collect();
    let high: Vec<f64> = open
        .iter()
        .zip(&close)
        .map(|(o, c)| o.max(*c) + 0.0005)
        .collect();
    let low: Vec<f64> = open
        .iter()
        .zip(&close)
        .map(|(o, c)| o.min(*c) - 0.0005)
        .collect();
    let volume = vec![100.0; count];
    bars(timestamps, open, high, low, close, volume)
}

pub(crate) fn bars(
    timestamps: Vec<i64>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    tick_volume: Vec<f64>,
) -> RecordBatch {
    let mut columns = BTreeMap::new();
    columns.insert(Column::Open, open);
    columns.insert(Column::High, high);
    columns.insert(Column::Low, low);
    columns.insert(Column::Close, close);
    columns.insert(Column::TickVolume, tick_volume);
    RecordBatch::new(BatchKind::Bars, timestamps, columns).expect("bar batch")
}

pub(crate) fn ticks(timestamps: Vec<i64>, bid: Vec<f64>, ask: Vec<f64>) -> RecordBatch {
    let mut columns = BTreeMap::new();
    columns.insert(Column::Bid, bid);
    columns.insert(Column::Ask, ask);
    RecordBatch::new(BatchKind::Ticks, timestamps, columns).expect("tick batch")
}

/// Replace one value of `column` at `row`.
pub(crate) fn with_value(batch: &RecordBatch, column: Column, row: usize, value: f64) -> RecordBatch {
    let mut values = batch.column(column).expect("column").to_vec();
    values[row] = value;
    batch.clone().with_column(column, values)
}
