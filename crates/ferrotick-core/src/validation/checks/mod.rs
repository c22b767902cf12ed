mod duplicate;
mod gap;
mod missing_timestamp;
mod price_sanity;
mod spike;
mod spread;
mod zero_volume;

pub use duplicate::DuplicateDetector;
pub use gap::GapDetector;
pub use missing_timestamp::MissingTimestampDetector;
pub use price_sanity::PriceSanityCheck;
pub use spike::SpikeDetector;
pub use spread::SpreadAnalyzer;
pub use zero_volume::ZeroVolumeDetector;
