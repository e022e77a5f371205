//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! The per-indicator calculators are assembled into per-bar snapshots by
//! [`engine::IndicatorEngine`].

pub mod engine;
pub mod momentum;
pub mod rsi;
pub mod sma;
pub mod snapshot;
pub mod volatility;
pub mod volume_ratio;

use chrono::{DateTime, Utc};
use std::fmt;

pub use engine::{IndicatorConfig, IndicatorEngine, MovingAverageSpec};
pub use snapshot::IndicatorSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    pub value: f64,
}

impl IndicatorPoint {
    pub fn invalid(timestamp: DateTime<Utc>) -> Self {
        IndicatorPoint {
            timestamp,
            valid: false,
            value: 0.0,
        }
    }

    pub fn valid(timestamp: DateTime<Utc>, value: f64) -> Self {
        IndicatorPoint {
            timestamp,
            valid: true,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    Momentum(usize),
    Volatility(usize),
    VolumeRatio(usize),
    VolatilityPercentile { window: usize, percentile_x100: u32 },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at `index`, or `None` inside the warm-up prefix.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    /// Index of the first valid point.
    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Momentum(period) => write!(f, "MOMENTUM({})", period),
            IndicatorType::Volatility(period) => write!(f, "VOLATILITY({})", period),
            IndicatorType::VolumeRatio(period) => write!(f, "VOLUME_RATIO({})", period),
            IndicatorType::VolatilityPercentile {
                window,
                percentile_x100,
            } => write!(f, "VOLATILITY_P{}({})", percentile_x100, window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_sma() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
    }

    #[test]
    fn indicator_type_display_percentile() {
        let p = IndicatorType::VolatilityPercentile {
            window: 50,
            percentile_x100: 70,
        };
        assert_eq!(p.to_string(), "VOLATILITY_P70(50)");
    }

    #[test]
    fn value_at_respects_validity() {
        let ts = DateTime::<Utc>::UNIX_EPOCH;
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![IndicatorPoint::invalid(ts), IndicatorPoint::valid(ts, 4.5)],
        };
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), Some(4.5));
        assert_eq!(series.value_at(2), None);
        assert_eq!(series.first_valid(), Some(1));
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Sma(5), "short");
        map.insert(IndicatorType::Sma(30), "long");
        map.insert(IndicatorType::Rsi(14), "rsi");

        assert_eq!(map.get(&IndicatorType::Sma(5)), Some(&"short"));
        assert_eq!(map.get(&IndicatorType::Rsi(14)), Some(&"rsi"));
        assert_eq!(map.get(&IndicatorType::Rsi(7)), None);
    }
}
