//! RSI (Relative Strength Index) indicator implementation.
//!
//! Simple rolling means over the last n price changes:
//! - avg_gain = mean(max(C[j] - C[j-1], 0)) for j in i-n+1..=i
//! - avg_loss = mean(max(C[j-1] - C[j], 0)) for j in i-n+1..=i
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 it is replaced by [`RSI_LOSS_EPSILON`], which pushes RSI
//! towards (never onto) 100 in a strictly rising run. Backtest results depend
//! on this substitution, keep it.
//!
//! Warmup: first n bars are invalid (need n price changes).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const RSI_LOSS_EPSILON: f64 = 0.0001;

pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: bars
                .iter()
                .map(|b| IndicatorPoint::invalid(b.timestamp))
                .collect(),
        };
    }

    // gains[i] / losses[i] hold the change into bar i; index 0 is unused.
    let mut gains = vec![0.0; bars.len()];
    let mut losses = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            gains[i] = change;
        } else if change < 0.0 {
            losses[i] = -change;
        }
    }

    let mut values = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if i < period {
            values.push(IndicatorPoint::invalid(bar.timestamp));
            continue;
        }

        let start = i + 1 - period;
        let avg_gain = gains[start..=i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[start..=i].iter().sum::<f64>() / period as f64;
        values.push(IndicatorPoint::valid(
            bar.timestamp,
            rsi_from_averages(avg_gain, avg_loss),
        ));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

pub fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let avg_loss = if avg_loss == 0.0 {
        RSI_LOSS_EPSILON
    } else {
        avg_loss
    };
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}
