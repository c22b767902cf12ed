use thiserror::Error;

/// Value and record invariant violations raised by validating factories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid granularity '{value}', expected one of M1, M5, M15, M30, H1, H4, D1, W1, MN1")]
    InvalidGranularity { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp_us must be positive, got {value}")]
    NonPositiveTimestamp { value: i64 },
    #[error("timestamp_us {value} is outside the representable calendar range")]
    TimestampOutOfRange { value: i64 },
    #[error("time range start {start_us} is after end {end_us}")]
    InvalidTimeRange { start_us: i64, end_us: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,
    #[error("tick ask must be >= bid")]
    CrossedQuote,

    #[error("price scale digits must be at most {max}, got {digits}")]
    InvalidPriceScale { digits: u32, max: u32 },
    #[error("field '{field}' overflows the fixed-point representation")]
    FixedPointOverflow { field: &'static str },
}

/// Shape errors: the batch does not carry the columns an operation needs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("batch is empty")]
    EmptyBatch,
    #[error("missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },
    #[error("column '{column}' is not valid for {kind} batches")]
    ForeignColumn { column: String, kind: String },
    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },
    #[error("expected a {expected} batch, got {actual}")]
    KindMismatch { expected: String, actual: String },
}

/// Partition key errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("invalid partition key '{key}'")]
    InvalidPartitionKey { key: String },
    #[error("timestamp_us {timestamp_us} cannot be mapped to a partition")]
    TimestampOutOfRange { timestamp_us: i64 },
}

/// Failure inside a single validator. The pipeline logs and skips these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("{check} failed: {message}")]
    Internal { check: String, message: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
