use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a data quality finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PriceSanity,
    Gap,
    Spike,
    MissingTimestamp,
    ZeroVolume,
    Duplicate,
    SpreadAnomaly,
    OhlcInconsistency,
}

impl IssueKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceSanity => "price_sanity",
            Self::Gap => "gap",
            Self::Spike => "spike",
            Self::MissingTimestamp => "missing_timestamp",
            Self::ZeroVolume => "zero_volume",
            Self::Duplicate => "duplicate",
            Self::SpreadAnomaly => "spread_anomaly",
            Self::OhlcInconsistency => "ohlc_inconsistency",
        }
    }
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Self; 4] = [Self::Info, Self::Warning, Self::Error, Self::Critical];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding. Built once by a validator and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    kind: IssueKind,
    severity: Severity,
    timestamp_us: i64,
    symbol: String,
    message: String,
    details: BTreeMap<String, Value>,
    check_name: String,
}

impl ValidationIssue {
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        timestamp_us: i64,
        symbol: impl Into<String>,
        message: impl Into<String>,
        check_name: impl Into<String>,
        details: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            kind,
            severity,
            timestamp_us,
            symbol: symbol.into(),
            message: message.into(),
            details,
            check_name: check_name.into(),
        }
    }

    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }
}

/// Collects issues for one validator run so checks don't repeat the symbol
/// and check name on every finding.
pub(crate) struct IssueSink<'a> {
    check_name: &'a str,
    symbol: &'a str,
    issues: Vec<ValidationIssue>,
}

impl<'a> IssueSink<'a> {
    pub(crate) fn new(check_name: &'a str, symbol: &'a str) -> Self {
        Self {
            check_name,
            symbol,
            issues: Vec::new(),
        }
    }

    pub(crate) fn push<const N: usize>(
        &mut self,
        kind: IssueKind,
        severity: Severity,
        timestamp_us: i64,
        message: String,
        details: [(&str, Value); N],
    ) {
        self.issues.push(ValidationIssue::new(
            kind,
            severity,
            timestamp_us,
            self.symbol,
            message,
            self.check_name,
            details
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
        ));
    }

    pub(crate) fn finish(self) -> Vec<ValidationIssue> {
        self.issues
    }
}
