//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i])
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Sma(period),
            values: bars
                .iter()
                .map(|b| IndicatorPoint::invalid(b.timestamp))
                .collect(),
        };
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i + 1 < period {
                IndicatorPoint::invalid(bar.timestamp)
            } else {
                let window = &bars[i + 1 - period..=i];
                let mean = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
                IndicatorPoint::valid(bar.timestamp, mean)
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
