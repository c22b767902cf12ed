//! Corrective transforms for record batches.
//!
//! Every transform takes a batch by reference and returns a new one.
//! [`DataCleaner::clean_all`] runs them in the same order the validators
//! inspect the data: dedup, gap fill, spike filter, volume fill.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats::{median, spike_rows};
use crate::{BatchKind, Column, ColumnKind, Granularity, RecordBatch};

/// How synthesized or corrected values are derived from their neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    ForwardFill,
    BackwardFill,
    /// Evenly spaced between neighbours by row position.
    LinearInterpolate,
    /// Weighted by elapsed time between neighbours.
    TimeInterpolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeReplacement {
    /// Rebuild the bar from its nearest clean neighbours.
    Interpolate,
    /// Drop the bar.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeFillMethod {
    ForwardFill,
    BackwardFill,
    Median,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub gap_method: FillMethod,
    /// Longest run of missing rows that will be synthesized. Longer gaps are
    /// left alone.
    pub max_gap: usize,
    /// Spacing used for gap filling; defaults to the granularity interval.
    pub expected_interval_us: Option<i64>,
    pub spike_threshold: f64,
    pub atr_period: usize,
    pub spike_replacement: SpikeReplacement,
    pub volume_method: VolumeFillMethod,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            gap_method: FillMethod::ForwardFill,
            max_gap: 5,
            expected_interval_us: None,
            spike_threshold: 3.0,
            atr_period: 14,
            spike_replacement: SpikeReplacement::Interpolate,
            volume_method: VolumeFillMethod::ForwardFill,
        }
    }
}

/// Result of [`DataCleaner::clean_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningOutcome {
    pub batch: RecordBatch,
    pub duplicates_removed: usize,
    pub rows_filled: usize,
    pub spikes_filtered: usize,
    pub volumes_filled: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DataCleaner {
    config: CleanerConfig,
}

impl DataCleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Sorted by timestamp, last occurrence of each timestamp kept.
    pub fn remove_duplicates(&self, batch: &RecordBatch) -> RecordBatch {
        batch.dedup_keep_last().0
    }

    /// Insert rows where consecutive timestamps are more than one interval
    /// apart, up to `max_gap` rows per gap. Prices and spread follow `method`;
    /// volume columns of synthesized rows are zero.
    ///
    /// Expects a sorted, duplicate-free batch.
    pub fn fill_gaps(
        &self,
        batch: &RecordBatch,
        interval_us: i64,
        method: FillMethod,
        max_gap: usize,
    ) -> RecordBatch {
        if interval_us <= 0 || batch.len() < 2 {
            return batch.clone();
        }

        let source = batch.timestamps();
        let mut timestamps = Vec::with_capacity(source.len());
        // (left row, right row, position in gap, gap length) for synthesized rows.
        let mut origins: Vec<Origin> = Vec::with_capacity(source.len());

        for row in 0..source.len() {
            if row > 0 {
                let (left, right) = (source[row - 1], source[row]);
                let delta = right - left;
                let missing = if delta > interval_us {
                    ((delta - 1) / interval_us) as usize
                } else {
                    0
                };
                if missing > 0 && missing <= max_gap {
                    for step in 1..=missing {
                        timestamps.push(left + step as i64 * interval_us);
                        origins.push(Origin::Filled {
                            left: row - 1,
                            right: row,
                            step,
                            count: missing,
                        });
                    }
                }
            }
            timestamps.push(source[row]);
            origins.push(Origin::Existing(row));
        }

        if timestamps.len() == source.len() {
            return batch.clone();
        }

        let mut columns = BTreeMap::new();
        for (column, values) in batch.columns() {
            let output: Vec<f64> = origins
                .iter()
                .zip(&timestamps)
                .map(|(origin, ts)| match *origin {
                    Origin::Existing(row) => values[row],
                    Origin::Filled { .. } if column.is_volume() => 0.0,
                    Origin::Filled {
                        left,
                        right,
                        step,
                        count,
                    } => {
                        let (a, b) = (values[left], values[right]);
                        match method {
                            FillMethod::ForwardFill => a,
                            FillMethod::BackwardFill => b,
                            FillMethod::LinearInterpolate => {
                                a + (b - a) * step as f64 / (count + 1) as f64
                            }
                            FillMethod::TimeInterpolate => {
                                let (t0, t1) = (source[left], source[right]);
                                a + (b - a) * (ts - t0) as f64 / (t1 - t0) as f64
                            }
                        }
                    }
                })
                .collect();
            columns.insert(column, output);
        }
        // Lengths match by construction.
        RecordBatch::new(batch.kind(), timestamps, columns).unwrap_or_else(|_| batch.clone())
    }

    /// Replace or drop bars whose range exceeds `threshold` times the ATR.
    /// Tick batches and batches without OHLC are returned unchanged.
    pub fn filter_spikes(
        &self,
        batch: &RecordBatch,
        threshold: f64,
        atr_period: usize,
        replacement: SpikeReplacement,
    ) -> (RecordBatch, usize) {
        let (Some(high), Some(low), Some(close)) = (
            batch.column(Column::High),
            batch.column(Column::Low),
            batch.column(Column::Close),
        ) else {
            return (batch.clone(), 0);
        };
        if batch.kind() != BatchKind::Bars {
            return (batch.clone(), 0);
        }

        let spikes = spike_rows(high, low, close, atr_period, threshold);
        if spikes.is_empty() {
            return (batch.clone(), 0);
        }
        let excluded: HashSet<usize> = spikes.iter().copied().collect();

        match replacement {
            SpikeReplacement::Remove => {
                let keep: Vec<usize> = (0..batch.len()).filter(|i| !excluded.contains(i)).collect();
                (batch.take(&keep), spikes.len())
            }
            SpikeReplacement::Interpolate => {
                let mut output = batch.clone();
                for (column, values) in batch.columns() {
                    if column.kind() != ColumnKind::Price {
                        continue;
                    }
                    let mut values = values.to_vec();
                    for &row in &spikes {
                        values[row] = interpolate_from_clean(&values, &excluded, row);
                    }
                    output = output.with_column(column, values);
                }
                (output, spikes.len())
            }
        }
    }

    /// Replace zero, negative, or null volumes. Values with no usable
    /// neighbour in the fill direction are left as they are.
    pub fn fill_zero_volume(
        &self,
        batch: &RecordBatch,
        method: VolumeFillMethod,
    ) -> (RecordBatch, usize) {
        let mut output = batch.clone();
        let mut filled = 0;
        for (column, values) in batch.columns() {
            if !column.is_volume() {
                continue;
            }
            let mut values = values.to_vec();
            let bad = |v: f64| v.is_nan() || v <= 0.0;
            match method {
                VolumeFillMethod::ForwardFill => {
                    let mut last = None;
                    for value in &mut values {
                        if bad(*value) {
                            if let Some(previous) = last {
                                *value = previous;
                                filled += 1;
                            }
                        } else {
                            last = Some(*value);
                        }
                    }
                }
                VolumeFillMethod::BackwardFill => {
                    let mut next = None;
                    for value in values.iter_mut().rev() {
                        if bad(*value) {
                            if let Some(following) = next {
                                *value = following;
                                filled += 1;
                            }
                        } else {
                            next = Some(*value);
                        }
                    }
                }
                VolumeFillMethod::Median => {
                    let good: Vec<f64> = values.iter().copied().filter(|v| !bad(*v)).collect();
                    if let Some(median) = median(&good) {
                        for value in &mut values {
                            if bad(*value) {
                                *value = median;
                                filled += 1;
                            }
                        }
                    }
                }
            }
            output = output.with_column(column, values);
        }
        (output, filled)
    }

    /// Dedup, then gap fill (when an interval is known), spike filter, and
    /// volume fill.
    pub fn clean_all(
        &self,
        batch: &RecordBatch,
        granularity: Option<Granularity>,
    ) -> CleaningOutcome {
        let config = &self.config;
        let (deduped, duplicates_removed) = batch.dedup_keep_last();

        let interval = config
            .expected_interval_us
            .or_else(|| granularity.map(Granularity::interval_us));
        let gap_filled = match interval {
            Some(interval) => self.fill_gaps(&deduped, interval, config.gap_method, config.max_gap),
            None => deduped.clone(),
        };
        let rows_filled = gap_filled.len() - deduped.len();

        let (despiked, spikes_filtered) = self.filter_spikes(
            &gap_filled,
            config.spike_threshold,
            config.atr_period,
            config.spike_replacement,
        );
        let (batch, volumes_filled) = self.fill_zero_volume(&despiked, config.volume_method);

        debug!(
            rows_in = deduped.len() + duplicates_removed,
            rows_out = batch.len(),
            duplicates_removed,
            rows_filled,
            spikes_filtered,
            volumes_filled,
            "cleaned batch"
        );
        CleaningOutcome {
            batch,
            duplicates_removed,
            rows_filled,
            spikes_filtered,
            volumes_filled,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Existing(usize),
    Filled {
        left: usize,
        right: usize,
        step: usize,
        count: usize,
    },
}

/// Linear interpolation between the nearest rows not in `excluded`; the
/// nearest clean row when only one side exists.
fn interpolate_from_clean(values: &[f64], excluded: &HashSet<usize>, row: usize) -> f64 {
    let before = (0..row).rev().find(|i| !excluded.contains(i));
    let after = (row + 1..values.len()).find(|i| !excluded.contains(i));
    match (before, after) {
        (Some(b), Some(a)) => {
            let fraction = (row - b) as f64 / (a - b) as f64;
            values[b] + (values[a] - values[b]) * fraction
        }
        (Some(b), None) => values[b],
        (None, Some(a)) => values[a],
        (None, None) => values[row],
    }
}
