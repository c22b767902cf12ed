use crate::stats::median;
use crate::validation::issue::IssueSink;
use crate::validation::{
    column, number, CheckContext, IssueKind, Severity, ValidationIssue, Validator,
};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Bar ranges wider than `threshold` times the median range, once the batch
/// has at least `min_periods` rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadAnalyzer;

impl SpreadAnalyzer {
    pub const NAME: &'static str = "spread";
}

impl Validator for SpreadAnalyzer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, kind: BatchKind, _ctx: &CheckContext<'_>) -> bool {
        kind == BatchKind::Bars
    }

    fn required_columns(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> Vec<Column> {
        vec![Column::High, Column::Low]
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let config = &ctx.config.spread;
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        if batch.len() < config.min_periods.max(1) {
            return Ok(sink.finish());
        }

        let high = column(batch, Column::High)?;
        let low = column(batch, Column::Low)?;
        let ranges: Vec<f64> = high.iter().zip(low).map(|(h, l)| h - l).collect();
        let Some(median_range) = median(&ranges).filter(|m| *m > 0.0) else {
            return Ok(sink.finish());
        };

        for (ts, range) in batch.timestamps().iter().zip(&ranges) {
            if *range > config.threshold * median_range {
                sink.push(
                    IssueKind::SpreadAnomaly,
                    Severity::Warning,
                    *ts,
                    format!(
                        "bar range {range:.6} is {:.1}x the median range",
                        range / median_range
                    ),
                    [
                        ("range", number(*range)),
                        ("median_range", number(median_range)),
                    ],
                );
            }
        }
        Ok(sink.finish())
    }
}
