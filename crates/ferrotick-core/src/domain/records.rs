use serde::{Deserialize, Serialize};

use crate::{Granularity, Symbol, ValidationError};

/// Top-of-book quote update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    symbol: Symbol,
    timestamp_us: i64,
    bid: f64,
    ask: f64,
    bid_volume: f64,
    ask_volume: f64,
}

impl Tick {
    pub fn new(
        symbol: Symbol,
        timestamp_us: i64,
        bid: f64,
        ask: f64,
        bid_volume: f64,
        ask_volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_timestamp(timestamp_us)?;
        validate_positive("bid", bid)?;
        validate_positive("ask", ask)?;
        validate_non_negative("bid_volume", bid_volume)?;
        validate_non_negative("ask_volume", ask_volume)?;

        if ask < bid {
            return Err(ValidationError::CrossedQuote);
        }

        Ok(Self {
            symbol,
            timestamp_us,
            bid,
            ask,
            bid_volume,
            ask_volume,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn bid(&self) -> f64 {
        self.bid
    }

    pub fn ask(&self) -> f64 {
        self.ask
    }

    pub fn bid_volume(&self) -> f64 {
        self.bid_volume
    }

    pub fn ask_volume(&self) -> f64 {
        self.ask_volume
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// OHLC bar with tick volume, real volume, and spread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    symbol: Symbol,
    granularity: Granularity,
    timestamp_us: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    tick_volume: f64,
    real_volume: f64,
    spread: f64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        granularity: Granularity,
        timestamp_us: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        tick_volume: f64,
        real_volume: f64,
        spread: f64,
    ) -> Result<Self, ValidationError> {
        validate_timestamp(timestamp_us)?;
        validate_positive("open", open)?;
        validate_positive("high", high)?;
        validate_positive("low", low)?;
        validate_positive("close", close)?;
        validate_non_negative("tick_volume", tick_volume)?;
        validate_non_negative("real_volume", real_volume)?;
        validate_non_negative("spread", spread)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            symbol,
            granularity,
            timestamp_us,
            open,
            high,
            low,
            close,
            tick_volume,
            real_volume,
            spread,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn tick_volume(&self) -> f64 {
        self.tick_volume
    }

    pub fn real_volume(&self) -> f64 {
        self.real_volume
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// A single market data record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Tick(Tick),
    Bar(Bar),
}

impl Record {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Tick(tick) => tick.symbol(),
            Self::Bar(bar) => bar.symbol(),
        }
    }

    pub fn timestamp_us(&self) -> i64 {
        match self {
            Self::Tick(tick) => tick.timestamp_us(),
            Self::Bar(bar) => bar.timestamp_us(),
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            Self::Tick(_) => None,
            Self::Bar(bar) => Some(bar.granularity()),
        }
    }
}

impl From<Tick> for Record {
    fn from(value: Tick) -> Self {
        Self::Tick(value)
    }
}

impl From<Bar> for Record {
    fn from(value: Bar) -> Self {
        Self::Bar(value)
    }
}

/// Deserialization goes through the validating factories.
#[derive(Deserialize)]
struct TickFields {
    symbol: Symbol,
    timestamp_us: i64,
    bid: f64,
    ask: f64,
    bid_volume: f64,
    ask_volume: f64,
}

impl<'de> Deserialize<'de> for Tick {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = TickFields::deserialize(deserializer)?;
        Tick::new(
            fields.symbol,
            fields.timestamp_us,
            fields.bid,
            fields.ask,
            fields.bid_volume,
            fields.ask_volume,
        )
        .map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize)]
struct BarFields {
    symbol: Symbol,
    granularity: Granularity,
    timestamp_us: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    tick_volume: f64,
    real_volume: f64,
    spread: f64,
}

impl<'de> Deserialize<'de> for Bar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = BarFields::deserialize(deserializer)?;
        Bar::new(
            fields.symbol,
            fields.granularity,
            fields.timestamp_us,
            fields.open,
            fields.high,
            fields.low,
            fields.close,
            fields.tick_volume,
            fields.real_volume,
            fields.spread,
        )
        .map_err(serde::de::Error::custom)
    }
}

fn validate_timestamp(timestamp_us: i64) -> Result<(), ValidationError> {
    if timestamp_us <= 0 {
        return Err(ValidationError::NonPositiveTimestamp {
            value: timestamp_us,
        });
    }
    Ok(())
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd() -> Symbol {
        Symbol::parse("EURUSD").expect("symbol")
    }

    #[test]
    fn rejects_invalid_bar_bounds() {
        let err = Bar::new(
            eurusd(),
            Granularity::H1,
            1_704_067_200_000_000,
            1.10,
            1.12,
            1.09,
            1.125,
            10.0,
            0.0,
            1.0,
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidBarBounds));
    }

    #[test]
    fn rejects_inverted_bar_range() {
        let err = Bar::new(
            eurusd(),
            Granularity::H1,
            1_704_067_200_000_000,
            1.10,
            1.09,
            1.12,
            1.10,
            10.0,
            0.0,
            1.0,
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidBarRange));
    }

    #[test]
    fn rejects_crossed_quote_and_bad_timestamp() {
        let err = Tick::new(eurusd(), 1, 1.1002, 1.1001, 1.0, 1.0).expect_err("must fail");
        assert!(matches!(err, ValidationError::CrossedQuote));

        let err = Tick::new(eurusd(), 0, 1.1, 1.1, 1.0, 1.0).expect_err("must fail");
        assert!(matches!(err, ValidationError::NonPositiveTimestamp { .. }));
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = Tick::new(eurusd(), 1, 0.0, 1.1, 1.0, 1.0).expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::NonPositiveValue { field: "bid" }
        ));
    }

    #[test]
    fn deserialization_runs_the_factory() {
        let json = r#"{"symbol":"eurusd","timestamp_us":1,"bid":1.2,"ask":1.1,"bid_volume":1.0,"ask_volume":1.0}"#;
        let result: Result<Tick, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
