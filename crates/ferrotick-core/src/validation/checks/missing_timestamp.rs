use serde_json::json;

use crate::validation::issue::IssueSink;
use crate::validation::{CheckContext, IssueKind, Severity, ValidationIssue, Validator};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Intervals between consecutive rows longer than `tolerance` times the
/// expected spacing. The expected spacing comes from the config, then the
/// granularity. Ticks are only checked when the config sets it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingTimestampDetector;

impl MissingTimestampDetector {
    pub const NAME: &'static str = "missing_timestamps";

    fn expected_interval(ctx: &CheckContext<'_>) -> Option<i64> {
        ctx.config
            .missing_timestamp
            .expected_interval_us
            .or_else(|| ctx.granularity.map(|g| g.interval_us()))
            .filter(|interval| *interval > 0)
    }
}

impl Validator for MissingTimestampDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, kind: BatchKind, ctx: &CheckContext<'_>) -> bool {
        match kind {
            BatchKind::Bars => Self::expected_interval(ctx).is_some(),
            BatchKind::Ticks => ctx.config.missing_timestamp.expected_interval_us.is_some(),
        }
    }

    fn required_columns(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> Vec<Column> {
        Vec::new()
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        let Some(expected) = Self::expected_interval(ctx) else {
            return Ok(sink.finish());
        };
        let tolerance = ctx.config.missing_timestamp.tolerance;

        for pair in batch.timestamps().windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            let delta = current.saturating_sub(previous);
            if delta <= 0 || (delta as f64) <= tolerance * expected as f64 {
                continue;
            }
            let missing = ((delta as f64 / expected as f64).round() as i64 - 1).max(1);
            sink.push(
                IssueKind::MissingTimestamp,
                Severity::Warning,
                current,
                format!("{missing} row(s) missing after {previous} (gap of {delta}us)"),
                [
                    ("previous_timestamp_us", json!(previous)),
                    ("gap_us", json!(delta)),
                    ("expected_interval_us", json!(expected)),
                    ("missing_count", json!(missing)),
                ],
            );
        }
        Ok(sink.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hourly_bars, ticks, HOUR_US, JAN_1_2024};
    use crate::validation::ValidationConfig;
    use crate::Granularity;

    #[test]
    fn estimates_missing_rows_from_gap() {
        let batch = hourly_bars(10);
        let keep: Vec<usize> = (0..10).filter(|i| !(3..6).contains(i)).collect();
        let batch = batch.take(&keep);
        let config = ValidationConfig::default();
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: Some(Granularity::H1),
            config: &config,
        };

        let issues = MissingTimestampDetector.check(&batch, &ctx).expect("check");

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].timestamp_us(), JAN_1_2024 + 6 * HOUR_US);
        assert_eq!(issues[0].details()["missing_count"], json!(3));
    }

    #[test]
    fn ticks_need_an_explicit_interval() {
        let batch = ticks(vec![1, 2], vec![1.0, 1.0], vec![1.1, 1.1]);
        let mut config = ValidationConfig::default();
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: None,
            config: &config,
        };
        assert!(!MissingTimestampDetector.applies_to(batch.kind(), &ctx));

        config.missing_timestamp.expected_interval_us = Some(1_000_000);
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: None,
            config: &config,
        };
        assert!(MissingTimestampDetector.applies_to(batch.kind(), &ctx));
    }
}
