use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{IssueKind, Severity, ValidationIssue};

/// A validator that errored or panicked and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub check: String,
    pub error: String,
}

/// Outcome of running the pipeline over one batch. Counts and rates are
/// derived from the issue list on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    symbol: String,
    total_records: usize,
    checks_run: Vec<String>,
    checks_skipped: Vec<String>,
    checks_failed: Vec<CheckFailure>,
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new(symbol: impl Into<String>, total_records: usize) -> Self {
        Self {
            symbol: symbol.into(),
            total_records,
            checks_run: Vec::new(),
            checks_skipped: Vec::new(),
            checks_failed: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub(crate) fn record_run(&mut self, check: &str, issues: Vec<ValidationIssue>) {
        self.checks_run.push(check.to_owned());
        self.issues.extend(issues);
    }

    pub(crate) fn record_skipped(&mut self, check: &str) {
        self.checks_skipped.push(check.to_owned());
    }

    pub(crate) fn record_failure(&mut self, check: &str, error: String) {
        self.checks_failed.push(CheckFailure {
            check: check.to_owned(),
            error,
        });
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn checks_run(&self) -> &[String] {
        &self.checks_run
    }

    pub fn checks_skipped(&self) -> &[String] {
        &self.checks_skipped
    }

    pub fn checks_failed(&self) -> &[CheckFailure] {
        &self.checks_failed
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity() == severity)
            .count()
    }

    pub fn count_by_kind(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind() == kind).count()
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity()).or_insert(0) += 1;
        }
        counts
    }

    pub fn kind_counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_critical(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity() == Severity::Critical)
    }

    /// No Error or Critical findings.
    pub fn is_valid(&self) -> bool {
        self.issues
            .iter()
            .all(|issue| issue.severity() < Severity::Error)
    }

    /// Fraction of records with no Error or Critical finding. Rows are
    /// identified by timestamp, so duplicated rows count once.
    pub fn pass_rate(&self) -> f64 {
        if self.total_records == 0 {
            return 1.0;
        }
        let failed: BTreeSet<i64> = self
            .issues
            .iter()
            .filter(|issue| issue.severity() >= Severity::Error)
            .map(ValidationIssue::timestamp_us)
            .collect();
        let failed = failed.len().min(self.total_records);
        (self.total_records - failed) as f64 / self.total_records as f64
    }

    pub fn summary(&self) -> String {
        let counts: Vec<String> = Severity::ALL
            .iter()
            .rev()
            .map(|severity| format!("{severity}={}", self.count_by_severity(*severity)))
            .collect();
        format!(
            "{}: {} records, {} checks run, {} skipped, {} failed, issues [{}], pass rate {:.2}%",
            self.symbol,
            self.total_records,
            self.checks_run.len(),
            self.checks_skipped.len(),
            self.checks_failed.len(),
            counts.join(", "),
            self.pass_rate() * 100.0
        )
    }
}
