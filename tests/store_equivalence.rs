//! Backend equivalence tests
//!
//! The Parquet and block backends are interchangeable: the same writes must
//! read back as the same logical data through either one.

mod common;

use std::collections::BTreeMap;
use std::path::Path;

use common::{eurusd, hourly_bars, ticks, HOUR_US, JAN_1_2024, MINUTE_US};
use ferrotick_core::{BatchKind, Column, Granularity, PriceScale, RecordBatch, TimeRange};
use ferrotick_warehouse::{BlockStore, DataStore, ParquetStore, WarehouseError, WriteMode};
use tempfile::tempdir;

fn both_stores(root: &Path) -> (ParquetStore, BlockStore) {
    let scale = PriceScale::default();
    (
        ParquetStore::parquet(root.join("parquet"), scale, 1_000),
        BlockStore::block(root.join("block"), scale, 7),
    )
}

fn write_all(
    stores: [&dyn DataStore; 2],
    granularity: Option<Granularity>,
    batch: &RecordBatch,
    partition: &str,
    mode: WriteMode,
) {
    for store in stores {
        store
            .write(&eurusd(), granularity, batch, partition, mode)
            .expect("write");
    }
}

fn read_both(
    parquet: &ParquetStore,
    block: &BlockStore,
    granularity: Option<Granularity>,
    range: Option<TimeRange>,
    columns: Option<&[Column]>,
) -> (RecordBatch, RecordBatch) {
    (
        parquet
            .read(&eurusd(), granularity, range, columns, None)
            .expect("parquet read"),
        block
            .read(&eurusd(), granularity, range, columns, None)
            .expect("block read"),
    )
}

// =============================================================================
// Bars
// =============================================================================

#[test]
fn when_the_same_bars_are_stored_both_backends_read_them_back_identically() {
    // Given: Two appends into one partition through both backends
    let temp = tempdir().expect("tempdir");
    let (parquet, block) = both_stores(temp.path());
    write_all(
        [&parquet, &block],
        Some(Granularity::H1),
        &hourly_bars(JAN_1_2024, 30),
        "2024",
        WriteMode::Append,
    );
    write_all(
        [&parquet, &block],
        Some(Granularity::H1),
        &hourly_bars(JAN_1_2024 + 30 * HOUR_US, 30),
        "2024",
        WriteMode::Append,
    );

    // When: Both are read in full
    let (from_parquet, from_block) =
        read_both(&parquet, &block, Some(Granularity::H1), None, None);

    // Then: The batches are logically equal
    assert_eq!(from_parquet.len(), 60);
    assert!(from_parquet.equivalent(&from_block));
}

#[test]
fn when_a_range_and_projection_are_requested_both_backends_agree() {
    // Given: 60 bars through both backends
    let temp = tempdir().expect("tempdir");
    let (parquet, block) = both_stores(temp.path());
    write_all(
        [&parquet, &block],
        Some(Granularity::H1),
        &hourly_bars(JAN_1_2024, 60),
        "2024",
        WriteMode::Overwrite,
    );

    // When: A window crossing block boundaries is read with two columns
    let range = TimeRange::new(JAN_1_2024 + 12 * HOUR_US, JAN_1_2024 + 40 * HOUR_US)
        .expect("range");
    let columns = [Column::Close, Column::TickVolume];
    let (from_parquet, from_block) = read_both(
        &parquet,
        &block,
        Some(Granularity::H1),
        Some(range),
        Some(&columns),
    );

    // Then: Both return the same 29 rows and only those columns
    assert_eq!(from_block.len(), 29);
    assert_eq!(from_block.column_names(), vec![Column::Close, Column::TickVolume]);
    assert!(from_parquet.equivalent(&from_block));
}

#[test]
fn when_a_foreign_column_is_requested_both_backends_reject_it() {
    let temp = tempdir().expect("tempdir");
    let (parquet, block) = both_stores(temp.path());
    write_all(
        [&parquet, &block],
        Some(Granularity::H1),
        &hourly_bars(JAN_1_2024, 5),
        "2024",
        WriteMode::Append,
    );

    for store in [&parquet as &dyn DataStore, &block] {
        let error = store
            .read(&eurusd(), Some(Granularity::H1), None, Some(&[Column::Bid]), None)
            .expect_err("bid is not a bar column");
        assert!(matches!(error, WarehouseError::Schema(_)));
    }
}

#[test]
fn when_files_are_described_both_backends_report_the_same_summary() {
    let temp = tempdir().expect("tempdir");
    let (parquet, block) = both_stores(temp.path());
    write_all(
        [&parquet, &block],
        Some(Granularity::H1),
        &hourly_bars(JAN_1_2024, 20),
        "2024",
        WriteMode::Append,
    );

    let describe = |store: &dyn DataStore| {
        let path = store.partition_path(&eurusd(), Some(Granularity::H1), "2024");
        store.file_info(&path).expect("file info")
    };
    let from_parquet = describe(&parquet);
    let from_block = describe(&block);

    assert_eq!(from_parquet.row_count, 20);
    assert_eq!(from_parquet.row_count, from_block.row_count);
    assert_eq!(from_parquet.time_range, from_block.time_range);
    assert_eq!(from_parquet.columns, from_block.columns);
}

// =============================================================================
// Ticks
// =============================================================================

#[test]
fn when_ticks_carry_nulls_both_backends_preserve_them() {
    // Given: Ticks with a missing ask and sparse bid volume
    let temp = tempdir().expect("tempdir");
    let (parquet, block) = both_stores(temp.path());
    let base = ticks(JAN_1_2024, 12, MINUTE_US);
    let mut columns: BTreeMap<Column, Vec<f64>> = base
        .columns()
        .map(|(column, values)| (column, values.to_vec()))
        .collect();
    if let Some(ask) = columns.get_mut(&Column::Ask) {
        ask[3] = f64::NAN;
    }
    columns.insert(
        Column::BidVolume,
        (0..12)
            .map(|i| if i % 4 == 0 { f64::NAN } else { 1_000_000.0 })
            .collect(),
    );
    let batch = RecordBatch::new(BatchKind::Ticks, base.timestamps().to_vec(), columns)
        .expect("ticks");
    write_all([&parquet, &block], None, &batch, "2024-01", WriteMode::Append);

    // When: Both backends read the month back
    let (from_parquet, from_block) = read_both(&parquet, &block, None, None, None);

    // Then: Nulls come back as NaN in the same places
    assert!(from_parquet.equivalent(&from_block));
    assert_eq!(from_block.len(), 12);
    let ask = from_block.column(Column::Ask).expect("ask");
    assert!(ask[3].is_nan());
    assert!(!ask[2].is_nan());
}
