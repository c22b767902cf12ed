//! Small numeric helpers shared by validators and the cleaner. Non-finite
//! inputs are ignored by the aggregates.

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    } else {
        Some(finite[mid])
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// True range per row. The first row has no previous close and uses
/// `high - low`.
pub(crate) fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                return range;
            }
            let prev = close[i - 1];
            range
                .max((high[i] - prev).abs())
                .max((low[i] - prev).abs())
        })
        .collect()
}

/// Trailing simple moving average over `period` rows including the current
/// one. Rows before the first full window are `NaN`.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut output = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return output;
    }
    let mut sum: f64 = values[..period].iter().sum();
    output[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        output[i] = sum / period as f64;
    }
    output
}

/// Rows whose `high - low` exceeds `threshold` times the rolling ATR.
pub(crate) fn spike_rows(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    atr_period: usize,
    threshold: f64,
) -> Vec<usize> {
    if atr_period == 0 || high.len() < atr_period {
        return Vec::new();
    }
    let atr = rolling_mean(&true_range(high, low, close), atr_period);
    (0..high.len())
        .filter(|&i| atr[i].is_finite() && atr[i] > 0.0 && high[i] - low[i] > threshold * atr[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_nan() {
        assert_eq!(median(&[3.0, 1.0, f64::NAN, 2.0, 4.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn rolling_mean_starts_after_first_window() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn true_range_uses_previous_close() {
        let tr = true_range(&[10.0, 12.0], &[9.0, 11.5], &[9.5, 12.0]);
        assert_eq!(tr, vec![1.0, 2.5]);
    }
}
