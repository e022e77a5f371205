//! Volume ratio: current volume over its trailing average.
//!
//! VOLUME_RATIO(n)[i] = V[i] / mean(V[i-n+1..=i])
//! Falls back to 1.0 when any bar in the window has no volume or the average
//! is zero.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const NEUTRAL_VOLUME_RATIO: f64 = 1.0;

pub fn calculate_volume_ratio(bars: &[Bar], period: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if period == 0 || i + 1 < period {
                return IndicatorPoint::invalid(bar.timestamp);
            }

            let window = &bars[i + 1 - period..=i];
            let volumes: Option<Vec<f64>> = window.iter().map(|b| b.volume).collect();
            let ratio = match (volumes, bar.volume) {
                (Some(volumes), Some(current)) => {
                    let avg = volumes.iter().sum::<f64>() / period as f64;
                    if avg > 0.0 {
                        current / avg
                    } else {
                        NEUTRAL_VOLUME_RATIO
                    }
                }
                _ => NEUTRAL_VOLUME_RATIO,
            };
            IndicatorPoint::valid(bar.timestamp, ratio)
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        values,
    }
}
