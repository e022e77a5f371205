//! Rolling volatility: sample standard deviation of close.
//!
//! VOLATILITY(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n) / (n - 1))
//! Warmup: first (n-1) bars are invalid. n < 2 yields an all-invalid series.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_volatility(bars: &[Bar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if period < 2 || i + 1 < period {
            values.push(IndicatorPoint::invalid(bar.timestamp));
            continue;
        }

        let window = &bars[i + 1 - period..=i];
        let mean = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|b| {
                let diff = b.close - mean;
                diff * diff
            })
            .sum::<f64>()
            / (period - 1) as f64;

        values.push(IndicatorPoint::valid(bar.timestamp, variance.sqrt()));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Volatility(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                Bar::new(
                    Utc.with_ymd_and_hms(2024, 1, (i + 1) as u32, 0, 0, 0).unwrap(),
                    close,
                    close,
                    close,
                    close,
                )
            })
            .collect()
    }

    #[test]
    fn volatility_warmup() {
        let series = calculate_volatility(&make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn volatility_constant_values() {
        let series = calculate_volatility(&make_bars(&[100.0; 5]), 3);
        assert!(series.values[2].value.abs() < f64::EPSILON);
    }

    #[test]
    fn volatility_uses_sample_denominator() {
        let series = calculate_volatility(&make_bars(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 8);

        // population stddev is 2.0; sample stddev is sqrt(32 / 7)
        assert!(series.values[7].valid);
        assert!((series.values[7].value - (32.0_f64 / 7.0).sqrt()).abs() < 1e-10);
    }

    #[test]
    fn volatility_period_one_is_invalid() {
        let series = calculate_volatility(&make_bars(&[1.0, 2.0, 3.0]), 1);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
