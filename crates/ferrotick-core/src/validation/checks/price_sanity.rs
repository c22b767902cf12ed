use serde_json::json;

use crate::stats::median;
use crate::validation::issue::IssueSink;
use crate::validation::{
    column, number, CheckContext, IssueKind, Severity, ValidationIssue, Validator,
};
use crate::{BatchKind, CheckError, Column, RecordBatch};

/// Non-positive prices, inconsistent OHLC, crossed quotes, and prices far
/// from the batch median.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceSanityCheck;

impl PriceSanityCheck {
    pub const NAME: &'static str = "price_sanity";
}

impl Validator for PriceSanityCheck {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, _kind: BatchKind, _ctx: &CheckContext<'_>) -> bool {
        true
    }

    fn required_columns(&self, kind: BatchKind, _ctx: &CheckContext<'_>) -> Vec<Column> {
        kind.mandatory_columns().to_vec()
    }

    fn check(
        &self,
        batch: &RecordBatch,
        ctx: &CheckContext<'_>,
    ) -> Result<Vec<ValidationIssue>, CheckError> {
        let mut sink = IssueSink::new(Self::NAME, ctx.symbol);
        let reference = match batch.kind() {
            BatchKind::Bars => check_bars(batch, &mut sink)?,
            BatchKind::Ticks => check_ticks(batch, &mut sink)?,
        };
        flag_median_outliers(
            batch.timestamps(),
            &reference,
            ctx.config.price_sanity.median_deviation,
            &mut sink,
        );
        Ok(sink.finish())
    }
}

/// Returns close prices for the median pass.
fn check_bars(batch: &RecordBatch, sink: &mut IssueSink<'_>) -> Result<Vec<f64>, CheckError> {
    let open = column(batch, Column::Open)?;
    let high = column(batch, Column::High)?;
    let low = column(batch, Column::Low)?;
    let close = column(batch, Column::Close)?;

    for (row, ts) in batch.timestamps().iter().enumerate() {
        let prices = [
            (Column::Open, open[row]),
            (Column::High, high[row]),
            (Column::Low, low[row]),
            (Column::Close, close[row]),
        ];
        if !flag_non_positive(*ts, &prices, sink) {
            continue;
        }

        let (o, h, l, c) = (open[row], high[row], low[row], close[row]);
        if h < l {
            sink.push(
                IssueKind::OhlcInconsistency,
                Severity::Critical,
                *ts,
                format!("high {h} is below low {l}"),
                [("high", number(h)), ("low", number(l))],
            );
            continue;
        }
        if h < o.max(c) {
            sink.push(
                IssueKind::OhlcInconsistency,
                Severity::Error,
                *ts,
                format!("high {h} is below max(open, close) {}", o.max(c)),
                [("high", number(h)), ("open", number(o)), ("close", number(c))],
            );
        }
        if l > o.min(c) {
            sink.push(
                IssueKind::OhlcInconsistency,
                Severity::Error,
                *ts,
                format!("low {l} is above min(open, close) {}", o.min(c)),
                [("low", number(l)), ("open", number(o)), ("close", number(c))],
            );
        }
    }

    Ok(close.to_vec())
}

/// Returns mid prices for the median pass.
fn check_ticks(batch: &RecordBatch, sink: &mut IssueSink<'_>) -> Result<Vec<f64>, CheckError> {
    let bid = column(batch, Column::Bid)?;
    let ask = column(batch, Column::Ask)?;

    for (row, ts) in batch.timestamps().iter().enumerate() {
        let prices = [(Column::Bid, bid[row]), (Column::Ask, ask[row])];
        if !flag_non_positive(*ts, &prices, sink) {
            continue;
        }
        if ask[row] < bid[row] {
            sink.push(
                IssueKind::PriceSanity,
                Severity::Error,
                *ts,
                format!("crossed quote: ask {} below bid {}", ask[row], bid[row]),
                [("bid", number(bid[row])), ("ask", number(ask[row]))],
            );
        }
    }

    Ok(bid.iter().zip(ask).map(|(b, a)| (b + a) / 2.0).collect())
}

/// Pushes a Critical issue per bad price. Returns true when all are usable.
fn flag_non_positive(ts: i64, prices: &[(Column, f64)], sink: &mut IssueSink<'_>) -> bool {
    let mut usable = true;
    for (column, value) in prices {
        if !(value.is_finite() && *value > 0.0) {
            usable = false;
            sink.push(
                IssueKind::PriceSanity,
                Severity::Critical,
                ts,
                format!("{column} price {value} is not positive"),
                [("column", json!(column.as_str())), ("value", number(*value))],
            );
        }
    }
    usable
}

fn flag_median_outliers(timestamps: &[i64], prices: &[f64], k: f64, sink: &mut IssueSink<'_>) {
    let Some(median) = median(prices) else {
        return;
    };
    if median <= 0.0 {
        return;
    }
    for (ts, price) in timestamps.iter().zip(prices) {
        let deviation = (price - median).abs();
        if price.is_finite() && deviation > k * median {
            sink.push(
                IssueKind::PriceSanity,
                Severity::Warning,
                *ts,
                format!("price {price} deviates {deviation:.6} from median {median}"),
                [
                    ("price", number(*price)),
                    ("median", number(median)),
                    ("deviation", number(deviation)),
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hourly_bars, ticks, with_value, JAN_1_2024};
    use crate::validation::ValidationConfig;

    fn run(batch: &RecordBatch) -> Vec<ValidationIssue> {
        let config = ValidationConfig::default();
        let ctx = CheckContext {
            symbol: "EURUSD",
            granularity: None,
            config: &config,
        };
        PriceSanityCheck.check(batch, &ctx).expect("check")
    }

    #[test]
    fn clean_bars_produce_no_issues() {
        assert!(run(&hourly_bars(50)).is_empty());
    }

    #[test]
    fn non_positive_price_is_critical() {
        let batch = with_value(&hourly_bars(10), Column::Low, 3, 0.0);
        let issues = run(&batch);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Critical);
        assert_eq!(issues[0].kind(), IssueKind::PriceSanity);
        assert_eq!(issues[0].timestamp_us(), batch.timestamps()[3]);
    }

    #[test]
    fn inverted_range_is_critical_and_open_above_high_is_error() {
        let inverted = with_value(&hourly_bars(10), Column::High, 2, 1.0);
        let issues = run(&inverted);
        assert!(issues
            .iter()
            .any(|i| i.kind() == IssueKind::OhlcInconsistency && i.severity() == Severity::Critical));

        let batch = hourly_bars(10);
        let high = batch.column(Column::High).expect("high")[4];
        let open_above = with_value(&batch, Column::Open, 4, high + 0.0001);
        let issues = run(&open_above);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Error);
    }

    #[test]
    fn far_from_median_is_warning() {
        let batch = hourly_bars(10);
        let batch = with_value(&batch, Column::High, 5, 3.0);
        let batch = with_value(&batch, Column::Close, 5, 2.9);
        let issues = run(&batch);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Warning);
        assert!(issues[0].details().contains_key("median"));
    }

    #[test]
    fn crossed_tick_quote_is_error() {
        let batch = ticks(
            vec![JAN_1_2024, JAN_1_2024 + 1],
            vec![1.1000, 1.1003],
            vec![1.1001, 1.1002],
        );
        let issues = run(&batch);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Error);
        assert_eq!(issues[0].timestamp_us(), JAN_1_2024 + 1);
    }
}
