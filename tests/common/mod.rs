#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use papertrader::domain::error::PapertraderError;
use papertrader::domain::indicator::{IndicatorConfig, IndicatorEngine, IndicatorSnapshot, MovingAverageSpec};
pub use papertrader::domain::ohlcv::Bar;
use papertrader::domain::signal::{Action, Signal, SignalSource};
use papertrader::ports::data_port::MarketDataPort;
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory feed. Prices default to the last close of the symbol's bars.
pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub prices: Mutex<HashMap<String, f64>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            prices: Mutex::new(HashMap::new()),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().insert(symbol.to_string(), price);
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, PapertraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(PapertraderError::data_unavailable(symbol, reason.clone()));
        }
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                Ok(bars[bars.len().saturating_sub(limit)..].to_vec())
            }
            _ => Err(PapertraderError::data_unavailable(symbol, "no bars")),
        }
    }

    fn fetch_last_price(&self, symbol: &str) -> Result<f64, PapertraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(PapertraderError::data_unavailable(symbol, reason.clone()));
        }
        if let Some(price) = self.prices.lock().get(symbol) {
            return Ok(*price);
        }
        self.data
            .get(symbol)
            .and_then(|bars| bars.last())
            .map(|bar| bar.close)
            .ok_or_else(|| PapertraderError::data_unavailable(symbol, "no price"))
    }
}

/// Buys below `buy_below`, sells above `sell_above`, holds otherwise.
pub struct PriceBand {
    pub buy_below: f64,
    pub sell_above: f64,
}

impl SignalSource for PriceBand {
    fn name(&self) -> &str {
        "price-band"
    }

    fn score(&self, snapshot: &IndicatorSnapshot) -> Signal {
        if snapshot.close < self.buy_below {
            Signal::new(Action::Buy, 0.8)
        } else if snapshot.close > self.sell_above {
            Signal::new(Action::Sell, 0.2)
        } else {
            Signal::neutral()
        }
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Daily bars with a constant volume.
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            Bar::new(
                start() + Duration::days(i as i64),
                close,
                close * 1.01,
                close * 0.99,
                close,
            )
            .with_volume(1_000.0)
        })
        .collect()
}

/// A deterministic wave around `base`.
pub fn wave(count: usize, base: f64) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            base * (1.0 + 0.08 * (t / 5.0).sin() + 0.03 * (t / 2.0).cos())
        })
        .collect()
}

/// Warm-up of one bar.
pub fn small_engine() -> IndicatorEngine {
    IndicatorEngine::new(small_indicator_config()).unwrap()
}

pub fn small_indicator_config() -> IndicatorConfig {
    IndicatorConfig {
        moving_averages: vec![MovingAverageSpec::new("short", 2)],
        rsi_period: 1,
        momentum_horizons: vec![1],
        volatility_window: 2,
        volume_window: 1,
        percentile_window: 2,
        volatility_percentile: 0.7,
    }
}

/// A weekday, inside any trading window.
pub fn weekday_noon(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}
