//! Per-bar indicator snapshot consumed by signal sources.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Derived values for one bar. Fields are optional so that literal snapshots
/// can omit what a scorer does not need; [`super::IndicatorEngine`] fills all
/// of them once warm-up is complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub moving_averages: BTreeMap<String, f64>,
    pub rsi: Option<f64>,
    /// Keyed by horizon in bars.
    pub momentum: BTreeMap<usize, f64>,
    pub volatility: Option<f64>,
    /// Trailing percentile of volatility, the "high volatility" cut-off.
    pub volatility_threshold: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        IndicatorSnapshot {
            timestamp,
            close,
            moving_averages: BTreeMap::new(),
            rsi: None,
            momentum: BTreeMap::new(),
            volatility: None,
            volatility_threshold: None,
            volume_ratio: None,
        }
    }

    pub fn with_sma(mut self, name: &str, value: f64) -> Self {
        self.moving_averages.insert(name.to_string(), value);
        self
    }

    pub fn with_rsi(mut self, rsi: f64) -> Self {
        self.rsi = Some(rsi);
        self
    }

    pub fn with_momentum(mut self, horizon: usize, value: f64) -> Self {
        self.momentum.insert(horizon, value);
        self
    }

    pub fn with_volatility(mut self, volatility: f64, threshold: f64) -> Self {
        self.volatility = Some(volatility);
        self.volatility_threshold = Some(threshold);
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }

    pub fn sma(&self, name: &str) -> Option<f64> {
        self.moving_averages.get(name).copied()
    }

    pub fn momentum(&self, horizon: usize) -> Option<f64> {
        self.momentum.get(&horizon).copied()
    }

    /// close / SMA(name)
    pub fn price_vs_sma(&self, name: &str) -> Option<f64> {
        self.sma(name).filter(|v| *v != 0.0).map(|v| self.close / v)
    }

    /// SMA(fast) / SMA(slow)
    pub fn sma_ratio(&self, fast: &str, slow: &str) -> Option<f64> {
        let fast = self.sma(fast)?;
        let slow = self.sma(slow).filter(|v| *v != 0.0)?;
        Some(fast / slow)
    }

    pub fn is_high_volatility(&self) -> Option<bool> {
        Some(self.volatility? > self.volatility_threshold?)
    }
}
