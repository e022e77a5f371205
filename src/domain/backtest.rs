//! Single-asset backtest replay.
//!
//! Replays bars through the indicator engine and a signal source with one
//! simulated position and no gates. An entry commits the whole balance; an
//! exit compounds the balance by the trade's return net of a round-trip
//! commission. The equity curve only moves on exits.

use serde::Serialize;
use tracing::debug;

use crate::domain::error::PapertraderError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::metrics::{max_drawdown_percent, total_return_percent, win_rate_percent};
use crate::domain::ohlcv::Bar;
use crate::domain::position::{ExitReason, Trade};
use crate::domain::signal::{Action, SignalSource};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    /// Charged on entry and on exit, as a fraction of the traded amount.
    pub commission_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_balance: 50.0,
            commission_rate: 0.001,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), PapertraderError> {
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err(PapertraderError::invalid(
                "trader",
                "initial_capital",
                "initial balance must be positive",
            ));
        }
        if !self.commission_rate.is_finite() || !(0.0..0.5).contains(&self.commission_rate) {
            return Err(PapertraderError::invalid(
                "backtest",
                "commission",
                "commission must be within [0, 0.5)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return_percent: f64,
    /// Number of closed round trips.
    pub total_trades: usize,
    pub win_rate: f64,
    pub max_drawdown_percent: f64,
    pub trades: Vec<Trade>,
    /// Initial balance followed by the balance after each exit.
    pub equity_curve: Vec<f64>,
}

struct OpenTrade {
    entry_price: f64,
    size: f64,
}

struct Ledger<'a> {
    symbol: &'a str,
    round_trip_cost: f64,
    balance: f64,
    equity_curve: Vec<f64>,
    trades: Vec<Trade>,
}

impl Ledger<'_> {
    fn enter(&mut self, bar: &Bar) -> OpenTrade {
        let size = self.balance;
        self.trades
            .push(Trade::entry(self.symbol, bar.close, size, bar.timestamp.naive_utc()));
        OpenTrade {
            entry_price: bar.close,
            size,
        }
    }

    fn exit(&mut self, open: OpenTrade, bar: &Bar, reason: ExitReason) {
        let ratio = (bar.close - open.entry_price) / open.entry_price - self.round_trip_cost;
        self.balance *= 1.0 + ratio;
        self.equity_curve.push(self.balance);
        self.trades.push(Trade::exit(
            self.symbol,
            bar.close,
            open.size,
            ratio,
            reason,
            bar.timestamp.naive_utc(),
        ));
    }
}

/// Fails when `bars` cannot produce a single complete snapshot.
pub fn require_history(
    symbol: &str,
    bars: &[Bar],
    engine: &IndicatorEngine,
) -> Result<(), PapertraderError> {
    let minimum = engine.warmup_len() + 1;
    if bars.len() < minimum {
        return Err(PapertraderError::InsufficientHistory {
            symbol: symbol.to_string(),
            bars: bars.len(),
            minimum,
        });
    }
    Ok(())
}

/// Runs the replay. Short histories produce a result with no trades.
pub fn run_backtest(
    symbol: &str,
    bars: &[Bar],
    config: &BacktestConfig,
    engine: &IndicatorEngine,
    source: &dyn SignalSource,
) -> Result<BacktestResult, PapertraderError> {
    config.validate()?;

    let snapshots = engine.compute(bars);
    let mut ledger = Ledger {
        symbol,
        round_trip_cost: 2.0 * config.commission_rate,
        balance: config.initial_balance,
        equity_curve: vec![config.initial_balance],
        trades: Vec::new(),
    };
    let mut open: Option<OpenTrade> = None;

    for i in engine.warmup_len()..bars.len() {
        // snapshots are causal, so the prefix scores exactly as bars[..=i] would
        let signal = source.score_latest(&snapshots[..=i]);
        let bar = &bars[i];

        open = match (signal.action, open.take()) {
            (Action::Buy, None) => {
                debug!(symbol, price = bar.close, confidence = signal.confidence, "backtest entry");
                Some(ledger.enter(bar))
            }
            (Action::Sell, Some(position)) => {
                debug!(symbol, price = bar.close, confidence = signal.confidence, "backtest exit");
                ledger.exit(position, bar, ExitReason::ManualExit);
                None
            }
            (_, current) => current,
        };
    }

    if let (Some(position), Some(last)) = (open, bars.last()) {
        ledger.exit(position, last, ExitReason::SellFinal);
    }

    let Ledger {
        balance,
        equity_curve,
        trades,
        ..
    } = ledger;
    Ok(BacktestResult {
        initial_balance: config.initial_balance,
        final_balance: balance,
        total_return_percent: total_return_percent(config.initial_balance, balance),
        total_trades: trades.iter().filter(|t| t.is_exit()).count(),
        win_rate: win_rate_percent(&trades),
        max_drawdown_percent: max_drawdown_percent(&equity_curve),
        trades,
        equity_curve,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{IndicatorConfig, IndicatorSnapshot, MovingAverageSpec};
    use crate::domain::position::TradeKind;
    use crate::domain::signal::Signal;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    /// Buys below 100, sells above 110.
    struct PriceBand;

    impl SignalSource for PriceBand {
        fn name(&self) -> &str {
            "price-band"
        }

        fn score(&self, snapshot: &IndicatorSnapshot) -> Signal {
            if snapshot.close < 100.0 {
                Signal::new(Action::Buy, 0.8)
            } else if snapshot.close > 110.0 {
                Signal::new(Action::Sell, 0.2)
            } else {
                Signal::neutral()
            }
        }
    }

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar::new(start + Duration::days(i as i64), close, close, close, close))
            .collect()
    }

    fn engine() -> IndicatorEngine {
        IndicatorEngine::new(IndicatorConfig {
            moving_averages: vec![MovingAverageSpec::new("short", 2)],
            rsi_period: 1,
            momentum_horizons: vec![1],
            volatility_window: 2,
            volume_window: 1,
            percentile_window: 2,
            volatility_percentile: 0.7,
        })
        .unwrap()
    }

    fn no_commission() -> BacktestConfig {
        BacktestConfig {
            initial_balance: 50.0,
            commission_rate: 0.0,
        }
    }

    #[test]
    fn round_trip_compounds_balance() {
        let bars = make_bars(&[105.0, 105.0, 90.0, 105.0, 117.0, 105.0]);
        let result = run_backtest("BTCUSDT", &bars, &no_commission(), &engine(), &PriceBand).unwrap();

        assert_eq!(result.total_trades, 1);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].kind, TradeKind::Entry);
        assert_eq!(result.trades[1].reason, Some(ExitReason::ManualExit));
        // 90 -> 117 = +30%
        assert_relative_eq!(result.final_balance, 65.0, epsilon = 1e-9);
        assert_relative_eq!(result.total_return_percent, 30.0, epsilon = 1e-9);
        assert_relative_eq!(result.win_rate, 100.0, epsilon = 1e-12);
        assert_eq!(result.equity_curve.len(), 2);
        assert!((result.max_drawdown_percent).abs() < f64::EPSILON);
    }

    #[test]
    fn commission_is_charged_both_ways() {
        let bars = make_bars(&[105.0, 105.0, 90.0, 117.0]);
        let config = BacktestConfig {
            initial_balance: 50.0,
            commission_rate: 0.001,
        };
        let result = run_backtest("BTCUSDT", &bars, &config, &engine(), &PriceBand).unwrap();
        assert_relative_eq!(result.final_balance, 50.0 * (1.0 + 0.3 - 0.002), epsilon = 1e-9);
    }

    #[test]
    fn open_position_closed_at_last_bar() {
        let bars = make_bars(&[105.0, 105.0, 95.0, 100.0, 85.5]);
        let result = run_backtest("BTCUSDT", &bars, &no_commission(), &engine(), &PriceBand).unwrap();

        let last = result.trades.last().unwrap();
        assert_eq!(last.reason, Some(ExitReason::SellFinal));
        assert_relative_eq!(last.price, 85.5, epsilon = 1e-12);
        assert_relative_eq!(result.final_balance, 45.0, epsilon = 1e-9);
        assert_relative_eq!(result.max_drawdown_percent, 10.0, epsilon = 1e-9);
        assert!((result.win_rate).abs() < f64::EPSILON);
    }

    #[test]
    fn equity_moves_only_on_exits() {
        let bars = make_bars(&[105.0, 105.0, 90.0, 80.0, 70.0, 99.0, 120.0]);
        let result = run_backtest("BTCUSDT", &bars, &no_commission(), &engine(), &PriceBand).unwrap();
        // a single entry at 90 despite repeated BUY signals
        assert_eq!(result.trades.iter().filter(|t| !t.is_exit()).count(), 1);
        assert_eq!(result.equity_curve.len(), 1 + result.total_trades);
    }

    #[test]
    fn short_history_has_no_trades() {
        let bars = make_bars(&[90.0]);
        let result = run_backtest("BTCUSDT", &bars, &no_commission(), &engine(), &PriceBand).unwrap();
        assert_eq!(result.total_trades, 0);
        assert_relative_eq!(result.final_balance, 50.0);
        assert_eq!(result.equity_curve, vec![50.0]);
    }

    #[test]
    fn history_must_cover_warmup() {
        let err = require_history("BTCUSDT", &make_bars(&[90.0]), &engine()).unwrap_err();
        assert!(matches!(err, PapertraderError::InsufficientHistory { minimum: 2, .. }));
        assert!(require_history("BTCUSDT", &make_bars(&[90.0, 91.0]), &engine()).is_ok());
    }

    #[test]
    fn trades_carry_symbol() {
        let bars = make_bars(&[105.0, 105.0, 90.0, 117.0]);
        let result = run_backtest("ETHUSDT", &bars, &no_commission(), &engine(), &PriceBand).unwrap();
        assert!(!result.trades.is_empty());
        assert!(result.trades.iter().all(|t| t.symbol == "ETHUSDT"));
    }

    #[test]
    fn deterministic() {
        let bars = make_bars(&[105.0, 99.0, 90.0, 111.0, 95.0, 120.0, 98.0]);
        let a = run_backtest("BTCUSDT", &bars, &BacktestConfig::default(), &engine(), &PriceBand).unwrap();
        let b = run_backtest("BTCUSDT", &bars, &BacktestConfig::default(), &engine(), &PriceBand).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_config() {
        let config = BacktestConfig {
            initial_balance: 0.0,
            commission_rate: 0.001,
        };
        assert!(run_backtest("BTCUSDT", &[], &config, &engine(), &PriceBand).is_err());
    }
}
