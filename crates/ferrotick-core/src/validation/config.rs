use serde::{Deserialize, Serialize};

use crate::Column;

/// Settings for every built-in check, passed down to validators unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub price_sanity: PriceSanityConfig,
    pub gap: GapConfig,
    pub spike: SpikeConfig,
    pub missing_timestamp: MissingTimestampConfig,
    pub zero_volume: ZeroVolumeConfig,
    pub spread: SpreadConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSanityConfig {
    /// Flag closes further than `median_deviation * median` from the median.
    pub median_deviation: f64,
}

impl Default for PriceSanityConfig {
    fn default() -> Self {
        Self {
            median_deviation: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Multiple of the mean bar range a close-to-close move must exceed.
    pub threshold: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Multiple of the rolling ATR a bar range must exceed.
    pub threshold: f64,
    pub atr_period: usize,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            atr_period: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingTimestampConfig {
    /// Gaps longer than `tolerance * expected interval` are reported.
    pub tolerance: f64,
    /// Overrides the interval implied by the granularity. Required for ticks.
    pub expected_interval_us: Option<i64>,
}

impl Default for MissingTimestampConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.5,
            expected_interval_us: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroVolumeConfig {
    pub column: Column,
}

impl Default for ZeroVolumeConfig {
    fn default() -> Self {
        Self {
            column: Column::TickVolume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    /// Multiple of the median bar range a range must exceed.
    pub threshold: f64,
    pub min_periods: usize,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            min_periods: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ValidationConfig =
            serde_json::from_str(r#"{"spike":{"atr_period":5}}"#).expect("parse");
        assert_eq!(config.spike.atr_period, 5);
        assert_eq!(config.spike.threshold, 3.0);
        assert_eq!(config.spread, SpreadConfig::default());
    }
}
