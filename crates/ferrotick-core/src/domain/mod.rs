//! # Domain Models
//!
//! Validated value types for market data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Tick`] | Bid/ask quote update |
//! | [`Bar`] | OHLC bar with volumes and spread |
//! | [`Record`] | Either of the above |
//! | [`Symbol`] | Validated instrument symbol |
//! | [`Granularity`] | Bar period (M1 .. MN1) |
//! | [`TimeRange`] | Inclusive microsecond window |
//! | [`PriceScale`] | Fixed-point price encoding |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Construction validates every invariant; none of these types expose
//! mutators.
//!
//! ```rust
//! use ferrotick_core::{Bar, Granularity, Symbol, ValidationError};
//!
//! let symbol = Symbol::parse("EURUSD").unwrap();
//! let invalid = Bar::new(symbol, Granularity::H1, 1, 1.10, 1.09, 1.12, 1.10, 0.0, 0.0, 0.0);
//! assert!(matches!(invalid, Err(ValidationError::InvalidBarRange)));
//! ```

mod granularity;
mod price;
mod range;
mod records;
mod symbol;
mod timestamp;

pub use granularity::Granularity;
pub use price::PriceScale;
pub use range::TimeRange;
pub use records::{Bar, Record, Tick};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
