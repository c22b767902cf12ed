//! Data quality checks over record batches.
//!
//! Built-in checks run in a fixed order so later checks can rely on earlier
//! findings (duplicates are reported before any interval arithmetic):
//!
//! | Order | Check | Applies to |
//! |-------|-------|------------|
//! | 1 | [`PriceSanityCheck`] | bars, ticks |
//! | 2 | [`DuplicateDetector`] | bars, ticks |
//! | 3 | [`GapDetector`] | bars |
//! | 4 | [`SpikeDetector`] | bars |
//! | 5 | [`MissingTimestampDetector`] | bars; ticks with an explicit interval |
//! | 6 | [`ZeroVolumeDetector`] | bars |
//! | 7 | [`SpreadAnalyzer`] | bars |

mod checks;
mod config;
mod issue;
mod pipeline;
mod report;

use serde_json::{Number, Value};

use crate::{BatchKind, CheckError, Column, Granularity, RecordBatch, SchemaError};

pub use checks::{
    DuplicateDetector, GapDetector, MissingTimestampDetector, PriceSanityCheck, SpikeDetector,
    SpreadAnalyzer, ZeroVolumeDetector,
};
pub use config::{
    GapConfig, MissingTimestampConfig, PriceSanityConfig, SpikeConfig, SpreadConfig,
    ValidationConfig, ZeroVolumeConfig,
};
pub use issue::{IssueKind, Severity, ValidationIssue};
pub use pipeline::ValidationPipeline;
pub use report::{CheckFailure, ValidationReport};

/// Inputs shared by every validator for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub symbol: &'a str,
    pub granularity: Option<Granularity>,
    pub config: &'a ValidationConfig,
}

/// A single quality check. Implementations must be pure: no state carried
/// between calls.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the check means anything for this kind of batch.
    fn applies_to(&self, kind: BatchKind, ctx: &CheckContext<'_>) -> bool;

    /// Columns the check reads. The pipeline skips the check when any is
    /// absent.
    fn required_columns(&self, kind: BatchKind, ctx: &CheckContext<'_>) -> Vec<Column>;

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError>;
}

pub(crate) fn column<'b>(batch: &'b RecordBatch, column: Column) -> Result<&'b [f64], CheckError> {
    batch.column(column).ok_or_else(|| {
        CheckError::Schema(SchemaError::MissingColumns {
            columns: vec![column.to_string()],
        })
    })
}

/// JSON number for a detail value; non-finite values become null.
pub(crate) fn number(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
