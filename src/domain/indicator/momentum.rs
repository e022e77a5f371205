//! Momentum (fractional rate of change).
//!
//! MOMENTUM(k)[i] = (C[i] - C[i-k]) / C[i-k]
//! If C[i-k] == 0: MOMENTUM = 0
//! Warmup: first k bars invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_momentum(bars: &[Bar], horizon: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if horizon == 0 || i < horizon {
                return IndicatorPoint::invalid(bar.timestamp);
            }
            let prev_close = bars[i - horizon].close;
            let value = if prev_close == 0.0 {
                0.0
            } else {
                (bar.close - prev_close) / prev_close
            };
            IndicatorPoint::valid(bar.timestamp, value)
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Momentum(horizon),
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
    fn momentum_warmup() {
        let series = calculate_momentum(&make_bars(&[100.0, 105.0, 110.0, 115.0, 120.0]), 3);

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(!series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn momentum_basic_calculation() {
        let series = calculate_momentum(&make_bars(&[100.0, 105.0, 110.0, 115.0]), 2);

        assert!((series.values[2].value - 0.10).abs() < 1e-12);
        assert!((series.values[3].value - (115.0 - 105.0) / 105.0).abs() < 1e-12);
    }

    #[test]
    fn momentum_zero_division() {
        let series = calculate_momentum(&make_bars(&[0.0, 100.0, 110.0]), 2);
        assert!(series.values[2].valid);
        assert!(series.values[2].value.abs() < f64::EPSILON);
    }

    #[test]
    fn momentum_negative_change() {
        let series = calculate_momentum(&make_bars(&[100.0, 90.0, 80.0]), 2);
        assert!((series.values[2].value - (-0.20)).abs() < 1e-12);
    }

    #[test]
    fn momentum_indicator_type() {
        let series = calculate_momentum(&make_bars(&[100.0, 105.0]), 10);
        assert_eq!(series.indicator_type, IndicatorType::Momentum(10));
    }
}
