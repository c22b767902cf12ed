use serde_json::json;

use crate::validation::issue::IssueSink;
use crate::validation::{
    column, number, CheckContext, IssueKind, Severity, ValidationIssue, Validator,
};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Bars with zero, negative, or null volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroVolumeDetector;

impl ZeroVolumeDetector {
    pub const NAME: &'static str = "zero_volume";
}

impl Validator for ZeroVolumeDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, kind: BatchKind, _ctx: &CheckContext<'_>) -> bool {
        kind == BatchKind::Bars
    }

    fn required_columns(&self, _kind: BatchKind, ctx: &CheckContext<'_>) -> Vec<Column> {
        vec![ctx.config.zero_volume.column]
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let target = ctx.config.zero_volume.column;
        let volume = column(batch, target)?;
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);

        for (ts, value) in batch.timestamps().iter().zip(volume) {
            if value.is_nan() || *value <= 0.0 {
                let message = if value.is_nan() {
                    format!("{target} is null")
                } else {
                    format!("{target} is {value}")
                };
                sink.push(
                    IssueKind::ZeroVolume,
                    Severity::Warning,
                    *ts,
                    message,
                    [("column", json!(target.as_str())), ("value", number(*value))],
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

    #[test]
    fn flags_zero_and_null_volume() {
        let batch = with_value(&hourly_bars(5), Column::TickVolume, 1, 0.0);
        let batch = with_value(&batch, Column::TickVolume, 3, f64::NAN);
        let config = ValidationConfig::default();
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: None,
            config: &config,
        };

        let issues = ZeroVolumeDetector.check(&batch, &ctx).expect("check");

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].details()["value"], serde_json::Value::Null);
    }
}
