use crate::stats::{rolling_mean, true_range};
use crate::validation::issue::IssueSink;
use crate::validation::{
    column, number, CheckContext, IssueKind, Severity, ValidationIssue, Validator,
};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Bars whose range exceeds `threshold` times the trailing ATR. Batches
/// shorter than `atr_period` are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpikeDetector;

impl SpikeDetector {
    pub const NAME: &'static str = "spikes";
}

impl Validator for SpikeDetector {
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
        let config = &ctx.config.spike;
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        if config.atr_period == 0 || batch.len() < config.atr_period {
            return Ok(sink.finish());
        }

        let high = column(batch, Column::High)?;
        let low = column(batch, Column::Low)?;
        let close = column(batch, Column::Close)?;
        let atr = rolling_mean(&true_range(high, low, close), config.atr_period);

        for (row, ts) in batch.timestamps().iter().enumerate() {
            let range = high[row] - low[row];
            if atr[row].is_finite() && atr[row] > 0.0 && range > config.threshold * atr[row] {
                sink.push(
                    IssueKind::Spike,
                    Severity::Warning,
                    *ts,
                    format!(
                        "bar range {range:.6} is {:.1}x the {}-bar ATR",
                        range / atr[row],
                        config.atr_period
                    ),
                    [
                        ("range", number(range)),
                        ("atr", number(atr[row])),
                        ("threshold", number(config.threshold)),
                    ],
                );
            }
        }
        Ok(sink.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hourly_bars, with_value};
    use crate::validation::ValidationConfig;

    fn run(batch: &RecordBatch) -> Vec<ValidationIssue> {
        let config = ValidationConfig::default();
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: None,
            config: &config,
        };
        SpikeDetector.check(batch, &ctx).expect("check")
    }

    #[test]
    fn flags_wide_bar() {
        let batch = with_value(&hourly_bars(40), Column::High, 30, 1.115);
        let issues = run(&batch);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].timestamp_us(), batch.timestamps()[30]);
    }

    #[test]
    fn short_batches_are_a_no_op() {
        let batch = with_value(&hourly_bars(10), Column::High, 9, 1.5);
        assert!(run(&batch).is_empty());
    }
}
