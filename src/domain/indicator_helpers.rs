//! Shared helper functions for indicator calculations.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

/// Percentile with linear interpolation between closest ranks, `q` in [0, 1].
/// Returns `None` for an empty sample or a `q` outside [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Trailing percentile of another series' valid values over `window` points
/// (current point included). A point is valid when the source point is.
pub fn rolling_percentile(source: &IndicatorSeries, window: usize, q: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::VolatilityPercentile {
        window,
        percentile_x100: (q * 100.0).round() as u32,
    };

    let values = source
        .values
        .iter()
        .enumerate()
        .map(|(i, point)| {
            if !point.valid || window == 0 {
                return IndicatorPoint::invalid(point.timestamp);
            }
            let start = (i + 1).saturating_sub(window);
            let sample: Vec<f64> = source.values[start..=i]
                .iter()
                .filter(|p| p.valid)
                .map(|p| p.value)
                .collect();
            match percentile(&sample, q) {
                Some(v) => IndicatorPoint::valid(point.timestamp, v),
                None => IndicatorPoint::invalid(point.timestamp),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn series(values: &[Option<f64>]) -> IndicatorSeries {
        let ts = DateTime::<Utc>::UNIX_EPOCH;
        IndicatorSeries {
            indicator_type: IndicatorType::Volatility(2),
            values: values
                .iter()
                .map(|v| match v {
                    Some(v) => IndicatorPoint::valid(ts, *v),
                    None => IndicatorPoint::invalid(ts),
                })
                .collect(),
        }
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&v, 0.5).unwrap() - 3.0).abs() < 1e-12);
        // rank 0.7 * 4 = 2.8 => 3 + 0.8
        assert!((percentile(&v, 0.7).unwrap() - 3.8).abs() < 1e-12);
        assert!((percentile(&v, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((percentile(&v, 1.0).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_unsorted_input() {
        let v = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert!((percentile(&v, 0.5).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_empty_and_out_of_range() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[1.0], 1.5), None);
    }

    #[test]
    fn rolling_percentile_follows_source_validity() {
        let source = series(&[None, Some(1.0), Some(3.0), Some(2.0)]);
        let result = rolling_percentile(&source, 2, 0.5);

        assert!(!result.values[0].valid);
        assert!((result.values[1].value - 1.0).abs() < 1e-12);
        assert!((result.values[2].value - 2.0).abs() < 1e-12);
        assert!((result.values[3].value - 2.5).abs() < 1e-12);
        assert_eq!(
            result.indicator_type,
            IndicatorType::VolatilityPercentile {
                window: 2,
                percentile_x100: 50
            }
        );
    }
}
