use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MINUTE_US: i64 = 60_000_000;

/// Aggregation period of a bar. Tick data has no granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Granularity {
    pub const ALL: [Self; 9] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::MN1,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
            Self::MN1 => "MN1",
        }
    }

    /// Nominal spacing between consecutive bars. `MN1` uses a 30-day month.
    pub const fn interval_us(self) -> i64 {
        match self {
            Self::M1 => MINUTE_US,
            Self::M5 => 5 * MINUTE_US,
            Self::M15 => 15 * MINUTE_US,
            Self::M30 => 30 * MINUTE_US,
            Self::H1 => 60 * MINUTE_US,
            Self::H4 => 240 * MINUTE_US,
            Self::D1 => 1_440 * MINUTE_US,
            Self::W1 => 7 * 1_440 * MINUTE_US,
            Self::MN1 => 30 * 1_440 * MINUTE_US,
        }
    }

    /// Minute and hour bars. Everything else is daily or coarser.
    pub const fn is_intraday(self) -> bool {
        matches!(
            self,
            Self::M1 | Self::M5 | Self::M15 | Self::M30 | Self::H1 | Self::H4
        )
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "m1" | "1m" => Ok(Self::M1),
            "m5" | "5m" => Ok(Self::M5),
            "m15" | "15m" => Ok(Self::M15),
            "m30" | "30m" => Ok(Self::M30),
            "h1" | "1h" => Ok(Self::H1),
            "h4" | "4h" => Ok(Self::H4),
            "d1" | "1d" => Ok(Self::D1),
            "w1" | "1w" => Ok(Self::W1),
            "mn1" | "1mo" => Ok(Self::MN1),
            _ => Err(ValidationError::InvalidGranularity {
                value: value.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(Granularity::from_str("h1").expect("parse"), Granularity::H1);
        assert_eq!(Granularity::from_str("1h").expect("parse"), Granularity::H1);
        assert_eq!(Granularity::from_str("1mo").expect("parse"), Granularity::MN1);
        assert_eq!(Granularity::from_str("1m").expect("parse"), Granularity::M1);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for granularity in Granularity::ALL {
            let parsed = Granularity::from_str(&granularity.to_string()).expect("parse");
            assert_eq!(parsed, granularity);
        }
    }

    #[test]
    fn rejects_unknown_granularity() {
        let err = Granularity::from_str("2h").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidGranularity { .. }));
    }

    #[test]
    fn classifies_intraday() {
        assert!(Granularity::H4.is_intraday());
        assert!(!Granularity::D1.is_intraday());
        assert_eq!(Granularity::H1.interval_us(), 3_600_000_000);
    }
}
