use std::collections::HashMap;

use serde_json::json;

use crate::validation::issue::IssueSink;
use crate::validation::{CheckContext, IssueKind, Severity, ValidationIssue, Validator};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Flags every row whose timestamp appears more than once, including the
/// first occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub const NAME: &'static str = "duplicates";
}

impl Validator for DuplicateDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> bool {
        true
    }

    fn required_columns(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> Vec<Column> {
        Vec::new()
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let mut occurrences: HashMap<i64, usize> = HashMap::with_capacity(batch.len());
        for ts in batch.timestamps() {
            *occurrences.entry(*ts).or_insert(0) += 1;
        }

        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        for (row, ts) in batch.timestamps().iter().enumerate() {
            let count = occurrences[ts];
            if count > 1 {
                sink.push(
                    IssueKind::Duplicate,
                    Severity::Error,
                    *ts,
                    format!("timestamp {ts} occurs {count} times"),
                    [("occurrences", json!(count)), ("row", json!(row))],
                );
            }
        }
        Ok(sink.finish())
    }
}
