//! Indicator pipeline: bars in, one optional snapshot per bar out.

use std::collections::{BTreeMap, HashSet};

use crate::domain::error::PapertraderError;
use crate::domain::indicator::momentum::calculate_momentum;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::volatility::calculate_volatility;
use crate::domain::indicator::volume_ratio::calculate_volume_ratio;
use crate::domain::indicator::{IndicatorSeries, IndicatorSnapshot};
use crate::domain::indicator_helpers::rolling_percentile;
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageSpec {
    pub name: String,
    pub period: usize,
}

impl MovingAverageSpec {
    pub fn new(name: &str, period: usize) -> Self {
        MovingAverageSpec {
            name: name.to_string(),
            period,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub moving_averages: Vec<MovingAverageSpec>,
    pub rsi_period: usize,
    pub momentum_horizons: Vec<usize>,
    pub volatility_window: usize,
    pub volume_window: usize,
    pub percentile_window: usize,
    /// Percentile of trailing volatility above which volatility counts as high.
    pub volatility_percentile: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            moving_averages: vec![
                MovingAverageSpec::new("short", 5),
                MovingAverageSpec::new("medium", 10),
                MovingAverageSpec::new("long", 30),
            ],
            rsi_period: 14,
            momentum_horizons: vec![1, 5, 10, 20],
            volatility_window: 20,
            volume_window: 20,
            percentile_window: 50,
            volatility_percentile: 0.7,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), PapertraderError> {
        if self.moving_averages.is_empty() {
            return Err(PapertraderError::invalid(
                "indicators",
                "moving_averages",
                "at least one moving average is required",
            ));
        }
        let mut seen = HashSet::new();
        for ma in &self.moving_averages {
            if ma.name.trim().is_empty() || ma.period == 0 {
                return Err(PapertraderError::invalid(
                    "indicators",
                    "moving_averages",
                    format!("invalid moving average '{}:{}'", ma.name, ma.period),
                ));
            }
            if !seen.insert(ma.name.as_str()) {
                return Err(PapertraderError::invalid(
                    "indicators",
                    "moving_averages",
                    format!("duplicate moving average name '{}'", ma.name),
                ));
            }
        }
        if self.rsi_period == 0 {
            return Err(PapertraderError::invalid(
                "indicators",
                "rsi_period",
                "rsi_period must be at least 1",
            ));
        }
        if self.momentum_horizons.contains(&0) {
            return Err(PapertraderError::invalid(
                "indicators",
                "momentum",
                "momentum horizons must be at least 1",
            ));
        }
        if self.volatility_window < 2 {
            return Err(PapertraderError::invalid(
                "indicators",
                "volatility_window",
                "volatility_window must be at least 2",
            ));
        }
        if self.volume_window == 0 {
            return Err(PapertraderError::invalid(
                "indicators",
                "volume_window",
                "volume_window must be at least 1",
            ));
        }
        if self.percentile_window == 0 {
            return Err(PapertraderError::invalid(
                "indicators",
                "percentile_window",
                "percentile_window must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.volatility_percentile) {
            return Err(PapertraderError::invalid(
                "indicators",
                "volatility_percentile",
                "volatility_percentile must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Computes the configured indicator set. Stateless apart from its
/// configuration; every call recomputes from the given bars.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Result<Self, PapertraderError> {
        config.validate()?;
        Ok(IndicatorEngine { config })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Index of the first bar with a complete snapshot, i.e. the longest lookback.
    pub fn warmup_len(&self) -> usize {
        let c = &self.config;
        let ma = c
            .moving_averages
            .iter()
            .map(|m| m.period - 1)
            .max()
            .unwrap_or(0);
        let momentum = c.momentum_horizons.iter().copied().max().unwrap_or(0);
        [
            ma,
            c.rsi_period,
            momentum,
            c.volatility_window - 1,
            c.volume_window - 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// One entry per bar; `None` until every configured indicator is valid.
    pub fn compute(&self, bars: &[Bar]) -> Vec<Option<IndicatorSnapshot>> {
        let c = &self.config;

        let mas: Vec<(&str, IndicatorSeries)> = c
            .moving_averages
            .iter()
            .map(|m| (m.name.as_str(), calculate_sma(bars, m.period)))
            .collect();
        let rsi = calculate_rsi(bars, c.rsi_period);
        let momentum: Vec<(usize, IndicatorSeries)> = c
            .momentum_horizons
            .iter()
            .map(|&h| (h, calculate_momentum(bars, h)))
            .collect();
        let volatility = calculate_volatility(bars, c.volatility_window);
        let threshold =
            rolling_percentile(&volatility, c.percentile_window, c.volatility_percentile);
        let volume = calculate_volume_ratio(bars, c.volume_window);

        bars.iter()
            .enumerate()
            .map(|(i, bar)| {
                let mut moving_averages = BTreeMap::new();
                for (name, series) in &mas {
                    moving_averages.insert(name.to_string(), series.value_at(i)?);
                }
                let mut momentum_values = BTreeMap::new();
                for (horizon, series) in &momentum {
                    momentum_values.insert(*horizon, series.value_at(i)?);
                }

                Some(IndicatorSnapshot {
                    timestamp: bar.timestamp,
                    close: bar.close,
                    moving_averages,
                    rsi: Some(rsi.value_at(i)?),
                    momentum: momentum_values,
                    volatility: Some(volatility.value_at(i)?),
                    volatility_threshold: Some(threshold.value_at(i)?),
                    volume_ratio: Some(volume.value_at(i)?),
                })
            })
            .collect()
    }

    /// Snapshot for the last bar, if warm-up is complete.
    pub fn latest(&self, bars: &[Bar]) -> Option<IndicatorSnapshot> {
        self.compute(bars).pop().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                Bar::new(start + Duration::days(i as i64), close, close, close, close)
                    .with_volume(1_000.0 + i as f64)
            })
            .collect()
    }

    fn small_config() -> IndicatorConfig {
        IndicatorConfig {
            moving_averages: vec![
                MovingAverageSpec::new("short", 2),
                MovingAverageSpec::new("long", 3),
            ],
            rsi_period: 2,
            momentum_horizons: vec![1, 2],
            volatility_window: 3,
            volume_window: 2,
            percentile_window: 5,
            volatility_percentile: 0.7,
        }
    }

    #[test]
    fn warmup_is_longest_lookback() {
        let engine = IndicatorEngine::new(IndicatorConfig::default()).unwrap();
        // SMA(30) needs 29 prior bars, momentum(20) needs 20, RSI(14) needs 14
        assert_eq!(engine.warmup_len(), 29);

        let engine = IndicatorEngine::new(small_config()).unwrap();
        assert_eq!(engine.warmup_len(), 2);
    }

    #[test]
    fn compute_same_length_with_absent_prefix() {
        let engine = IndicatorEngine::new(small_config()).unwrap();
        let bars = make_bars(&[100.0, 98.0, 96.0, 94.0, 130.0]);
        let snapshots = engine.compute(&bars);

        assert_eq!(snapshots.len(), bars.len());
        assert!(snapshots[0].is_none());
        assert!(snapshots[1].is_none());
        assert!(snapshots[2..].iter().all(|s| s.is_some()));
    }

    #[test]
    fn compute_short_input_never_fails() {
        let engine = IndicatorEngine::new(IndicatorConfig::default()).unwrap();
        let snapshots = engine.compute(&make_bars(&[100.0, 101.0, 102.0]));
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().all(|s| s.is_none()));
        assert!(engine.compute(&[]).is_empty());
    }

    #[test]
    fn snapshot_values() {
        let engine = IndicatorEngine::new(small_config()).unwrap();
        let bars = make_bars(&[100.0, 98.0, 96.0, 94.0, 130.0]);
        let last = engine.latest(&bars).unwrap();

        assert!((last.close - 130.0).abs() < f64::EPSILON);
        assert!((last.sma("short").unwrap() - 112.0).abs() < 1e-12);
        assert!((last.sma("long").unwrap() - (96.0 + 94.0 + 130.0) / 3.0).abs() < 1e-12);
        assert!((last.momentum(1).unwrap() - 36.0 / 94.0).abs() < 1e-12);
        assert!((last.momentum(2).unwrap() - 34.0 / 96.0).abs() < 1e-12);

        let rsi = last.rsi.unwrap();
        assert!(rsi > 90.0 && rsi < 100.0);
        assert!(last.volume_ratio.unwrap() > 0.0);
        assert!(last.volatility_threshold.is_some());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = small_config();
        config.moving_averages.push(MovingAverageSpec::new("short", 4));
        assert!(IndicatorEngine::new(config).is_err());

        let mut config = small_config();
        config.volatility_window = 1;
        assert!(IndicatorEngine::new(config).is_err());

        let mut config = small_config();
        config.moving_averages.clear();
        assert!(IndicatorEngine::new(config).is_err());

        let mut config = small_config();
        config.volatility_percentile = 1.5;
        assert!(IndicatorEngine::new(config).is_err());
    }
}
