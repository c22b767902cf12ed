use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Wall-clock instant at microsecond precision, always UTC.
///
/// Stored as microseconds since the Unix epoch, the same unit as record
/// timestamps and catalog columns. Serialized as RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime {
    micros: i64,
}

impl UtcDateTime {
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self {
            micros: i64::try_from(nanos / 1_000).unwrap_or(i64::MAX),
        }
    }

    /// Parse an RFC3339 string with a `Z` or `+00:00` offset.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let not_utc = || ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        };
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| not_utc())?;
        if parsed.offset() != UtcOffset::UTC {
            return Err(not_utc());
        }
        let micros = i64::try_from(parsed.unix_timestamp_nanos() / 1_000).map_err(|_| not_utc())?;
        Ok(Self { micros })
    }

    /// Build from microseconds since the Unix epoch, rejecting instants
    /// outside the calendar range RFC3339 can express.
    pub fn from_unix_micros(value: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(value) * 1_000)
            .map_err(|_| ValidationError::TimestampOutOfRange { value })?;
        Ok(Self { micros: value })
    }

    pub const fn unix_micros(self) -> i64 {
        self.micros
    }

    fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.micros) * 1_000)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.micros.to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
