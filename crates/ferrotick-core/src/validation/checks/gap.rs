use crate::stats::mean;
use crate::validation::issue::IssueSink;
use crate::validation::{
    column, number, CheckContext, IssueKind, Severity, ValidationIssue, Validator,
};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Close-to-close jumps larger than `threshold` times the mean bar range.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapDetector;

impl GapDetector {
    pub const NAME: &'static str = "gaps";
}

impl Validator for GapDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, kind: BatchKind, _ctx: &CheckContext<'_>) -> bool {
        kind == BatchKind::Bars
    }

    fn required_columns(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> Vec<Column> {
        vec![Column::High, Column::Low, Column::Close]
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let high = column(batch, Column::High)?;
        let low = column(batch, Column::Low)?;
        let close = column(batch, Column::Close)?;
        let threshold = ctx.config.gap.threshold;

        let ranges: Vec<f64> = high.iter().zip(low).map(|(h, l)| h - l).collect();
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        let Some(mean_range) = mean(&ranges).filter(|m| *m > 0.0) else {
            return Ok(sink.finish());
        };

        let timestamps = batch.timestamps();
        for row in 1..batch.len() {
            let gap = (close[row] - close[row - 1]).abs();
            if gap.is_finite() && gap > threshold * mean_range {
                sink.push(
                    IssueKind::Gap,
                    Severity::Warning,
                    timestamps[row],
                    format!(
                        "close moved {gap:.6} from previous bar, {:.1}x the mean range",
                        gap / mean_range
                    ),
                    [
                        ("gap", number(gap)),
                        ("mean_range", number(mean_range)),
                        ("previous_close", number(close[row - 1])),
                    ],
                );
            }
        }
        Ok(sink.finish())
    }
}
