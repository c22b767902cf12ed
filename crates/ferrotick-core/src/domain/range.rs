use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Inclusive time window in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start_us: i64,
    end_us: i64,
}

impl TimeRange {
    pub fn new(start_us: i64, end_us: i64) -> Result<Self, ValidationError> {
        if start_us > end_us {
            return Err(ValidationError::InvalidTimeRange { start_us, end_us });
        }
        Ok(Self { start_us, end_us })
    }

    /// The whole representable timeline.
    pub const fn full() -> Self {
        Self {
            start_us: i64::MIN,
            end_us: i64::MAX,
        }
    }

    pub const fn start_us(self) -> i64 {
        self.start_us
    }

    pub const fn end_us(self) -> i64 {
        self.end_us
    }

    pub const fn contains(self, timestamp_us: i64) -> bool {
        self.start_us <= timestamp_us && timestamp_us <= self.end_us
    }

    /// True when `[min_us, max_us]` shares at least one instant with this range.
    pub const fn overlaps(self, min_us: i64, max_us: i64) -> bool {
        self.start_us <= max_us && min_us <= self.end_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let err = TimeRange::new(10, 5).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidTimeRange { .. }));
    }

    #[test]
    fn bounds_are_inclusive() {
        let range = TimeRange::new(10, 20).expect("range");
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(21));
        assert!(range.overlaps(20, 30));
        assert!(!range.overlaps(21, 30));
    }
}
