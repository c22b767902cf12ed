use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_DIGITS: u32 = 12;

/// Decimal fixed-point scale used to persist prices as 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceScale {
    digits: u32,
}

impl PriceScale {
    pub fn new(digits: u32) -> Result<Self, ValidationError> {
        if digits > MAX_DIGITS {
            return Err(ValidationError::InvalidPriceScale {
                digits,
                max: MAX_DIGITS,
            });
        }
        Ok(Self { digits })
    }

    pub const fn digits(self) -> u32 {
        self.digits
    }

    pub fn factor(self) -> f64 {
        10_f64.powi(self.digits as i32)
    }

    /// Largest absolute error introduced by a `to_fixed`/`from_fixed` round trip.
    pub fn tolerance(self) -> f64 {
        0.5 / self.factor()
    }

    /// Scale and round half away from zero.
    pub fn to_fixed(self, value: f64) -> Result<i64, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "price" });
        }
        let scaled = (value * self.factor()).round();
        // i64::MIN is reserved as the null marker in the block format.
        if scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
            return Err(ValidationError::FixedPointOverflow { field: "price" });
        }
        Ok(scaled as i64)
    }

    pub fn from_fixed(self, raw: i64) -> f64 {
        raw as f64 / self.factor()
    }
}

impl Default for PriceScale {
    fn default() -> Self {
        Self { digits: 6 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_nearest_unit() {
        let scale = PriceScale::default();
        assert_eq!(scale.to_fixed(1.234_567_4).expect("fixed"), 1_234_567);
        assert_eq!(scale.to_fixed(1.234_567_6).expect("fixed"), 1_234_568);
        let whole = PriceScale::new(0).expect("scale");
        assert_eq!(whole.to_fixed(-2.5).expect("fixed"), -3);
    }

    #[test]
    fn round_trip_stays_within_tolerance() {
        let scale = PriceScale::new(5).expect("scale");
        let value = 1.095_437_9;
        let back = scale.from_fixed(scale.to_fixed(value).expect("fixed"));
        assert!((back - value).abs() <= scale.tolerance() + f64::EPSILON);
    }

    #[test]
    fn rejects_overflow_and_non_finite() {
        let scale = PriceScale::default();
        assert!(matches!(
            scale.to_fixed(1e20),
            Err(ValidationError::FixedPointOverflow { .. })
        ));
        assert!(matches!(
            scale.to_fixed(f64::NAN),
            Err(ValidationError::NonFiniteValue { .. })
        ));
        assert!(PriceScale::new(13).is_err());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(256))]

        #[test]
        fn any_price_round_trips_within_half_a_unit(
            value in 0.000_1_f64..1_000_000.0,
            digits in 0_u32..=8,
        ) {
            let scale = PriceScale::new(digits).expect("scale");
            let back = scale.from_fixed(scale.to_fixed(value).expect("fixed"));
            proptest::prop_assert!(
                (back - value).abs() <= scale.tolerance() + 1e-9,
                "{} -> {} at {} digits", value, back, digits
            );
        }
    }
}
