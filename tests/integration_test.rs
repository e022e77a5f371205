//! Integration tests across the domain, adapters and live loop.
//!
//! Tests cover:
//! - Multi-symbol backtest pipeline with MockDataPort (skips, comparison)
//! - Weighted scorer over a realistic indicator set
//! - RiskManager lifecycle: sizing, exits, daily gates and period rollover
//! - Live cycles driven synchronously against a mock feed
//! - CSV adapter feeding the backtest and the JSON report

mod common;

use approx::assert_relative_eq;
use common::*;
use papertrader::adapters::csv_adapter::CsvAdapter;
use papertrader::adapters::json_report_adapter::JsonReportAdapter;
use papertrader::cli;
use papertrader::domain::backtest::{BacktestConfig, run_backtest};
use papertrader::domain::config_validation::{LiveConfig, TraderConfig, build_trader_config};
use papertrader::domain::error::PapertraderError;
use papertrader::domain::execution::{Execution, RiskManager};
use papertrader::domain::indicator::{IndicatorConfig, IndicatorEngine};
use papertrader::domain::portfolio::PortfolioAllocation;
use papertrader::domain::position::ExitReason;
use papertrader::domain::risk::{GateRejection, RiskConfig};
use papertrader::domain::signal::{MAX_CONFIDENCE, MIN_CONFIDENCE, ScorerConfig, SignalSource, WeightedScorer};
use papertrader::live::LiveTrader;
use papertrader::adapters::file_config_adapter::FileConfigAdapter;
use papertrader::ports::report_port::ReportPort;
use std::sync::Arc;

fn trader_config(ini: &str) -> TraderConfig {
    build_trader_config(&FileConfigAdapter::from_string(ini).unwrap()).unwrap()
}

fn band() -> PriceBand {
    PriceBand {
        buy_below: 100.0,
        sell_above: 110.0,
    }
}

mod backtest_pipeline {
    use super::*;

    fn small_config() -> TraderConfig {
        let mut config = trader_config("[backtest]\ncommission = 0\n");
        config.indicators = small_indicator_config();
        config
    }

    #[test]
    fn multi_symbol_backtest_and_comparison() {
        let port = MockDataPort::new()
            .with_bars("BTCUSDT", make_bars(&[105.0, 105.0, 90.0, 117.0]))
            .with_bars("ETHUSDT", make_bars(&[105.0, 105.0, 95.0, 85.5]));
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];

        let report = cli::backtest_symbols(&port, &small_config(), &symbols, &band()).unwrap();

        let btc = &report.results["BTCUSDT"];
        assert_relative_eq!(btc.total_return_percent, 30.0, epsilon = 1e-9);
        let eth = &report.results["ETHUSDT"];
        assert_relative_eq!(eth.total_return_percent, -10.0, epsilon = 1e-9);
        assert_eq!(eth.trades.last().unwrap().reason, Some(ExitReason::SellFinal));

        let cmp = report.comparison().unwrap();
        assert_eq!(cmp.best.symbol, "BTCUSDT");
        assert_eq!(cmp.worst.symbol, "ETHUSDT");
        assert_eq!(cmp.profitable.len(), 1);
    }

    #[test]
    fn failing_and_short_symbols_are_skipped() {
        let port = MockDataPort::new()
            .with_bars("BTCUSDT", make_bars(&[105.0, 105.0, 90.0, 117.0]))
            .with_bars("ADAUSDT", make_bars(&[1.0]))
            .with_error("ETHUSDT", "timeout");
        let symbols = vec![
            "BTCUSDT".to_string(),
            "ETHUSDT".to_string(),
            "ADAUSDT".to_string(),
            "SOLUSDT".to_string(),
        ];

        let report = cli::backtest_symbols(&port, &small_config(), &symbols, &band()).unwrap();
        assert_eq!(report.results.keys().collect::<Vec<_>>(), vec!["BTCUSDT"]);
    }

    #[test]
    fn nothing_to_backtest_is_an_error() {
        let port = MockDataPort::new().with_error("BTCUSDT", "timeout");
        let err = cli::backtest_symbols(&port, &small_config(), &["BTCUSDT".to_string()], &band())
            .unwrap_err();
        assert!(matches!(err, PapertraderError::DataUnavailable { .. }));
    }

    #[test]
    fn weighted_backtest_is_deterministic() {
        let bars = make_bars(&wave(200, 30_000.0));
        let engine = IndicatorEngine::new(IndicatorConfig::default()).unwrap();
        let scorer = WeightedScorer::new(ScorerConfig::default()).unwrap();
        let config = BacktestConfig::default();

        let a = run_backtest("BTCUSDT", &bars, &config, &engine, &scorer).unwrap();
        let b = run_backtest("BTCUSDT", &bars, &config, &engine, &scorer).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.equity_curve.len(), a.total_trades + 1);
        assert!(a.max_drawdown_percent >= 0.0);
    }
}

mod weighted_scoring {
    use super::*;

    #[test]
    fn confidence_bounded_over_history() {
        let bars = make_bars(&wave(150, 2_000.0));
        let engine = IndicatorEngine::new(IndicatorConfig::default()).unwrap();
        let scorer = WeightedScorer::new(ScorerConfig::default()).unwrap();

        let snapshots = engine.compute(&bars);
        assert!(snapshots[..engine.warmup_len()].iter().all(Option::is_none));
        for snapshot in snapshots.iter().flatten() {
            let signal = scorer.score(snapshot);
            assert!(signal.confidence >= MIN_CONFIDENCE);
            assert!(signal.confidence <= MAX_CONFIDENCE);
        }
    }

    #[test]
    fn short_history_holds() {
        let bars = make_bars(&wave(10, 2_000.0));
        let engine = IndicatorEngine::new(IndicatorConfig::default()).unwrap();
        let scorer = WeightedScorer::new(ScorerConfig::default()).unwrap();
        let signal = scorer.score_latest(&engine.compute(&bars));
        assert!((signal.confidence - 0.5).abs() < f64::EPSILON);
    }
}

mod risk_lifecycle {
    use super::*;

    fn aggressive() -> RiskManager {
        RiskManager::new(RiskConfig {
            position_size: 1.0,
            stop_loss: 0.1,
            ..RiskConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn daily_loss_gate_closes_until_next_day() {
        let rm = aggressive();
        assert!(rm.buy("BTCUSDT", 100.0, weekday_noon(4)).is_filled());
        let exit = rm.monitor("BTCUSDT", 89.0, weekday_noon(4)).unwrap();
        assert_eq!(exit.reason, Some(ExitReason::StopLoss));
        assert_relative_eq!(rm.state().daily_pnl, -5.5, epsilon = 1e-9);

        assert_eq!(
            rm.buy("ETHUSDT", 50.0, weekday_noon(4)),
            Execution::Rejected(GateRejection::DailyLossLimit)
        );
        assert!(rm.buy("ETHUSDT", 50.0, weekday_noon(5)).is_filled());
    }

    #[test]
    fn weekend_gate() {
        let rm = RiskManager::new(RiskConfig {
            weekend_trading: false,
            ..RiskConfig::default()
        })
        .unwrap();
        // 2024-03-09 is a Saturday
        assert_eq!(
            rm.buy("BTCUSDT", 100.0, weekday_noon(9)),
            Execution::Rejected(GateRejection::Weekend)
        );
        assert!(rm.buy("BTCUSDT", 100.0, weekday_noon(11)).is_filled());
    }

    #[test]
    fn portfolio_weights_scale_entries() {
        let rm = RiskManager::new(RiskConfig {
            portfolio: PortfolioAllocation::from_pairs([("BTCUSDT", 0.3), ("ETHUSDT", 0.25)])
                .unwrap(),
            ..RiskConfig::default()
        })
        .unwrap();
        let btc = rm.buy("BTCUSDT", 100.0, weekday_noon(4));
        assert_relative_eq!(btc.trade().unwrap().size, 0.30, epsilon = 1e-12);
        // sized from the remaining balance
        let eth = rm.buy("ETHUSDT", 10.0, weekday_noon(4));
        assert_relative_eq!(eth.trade().unwrap().size, 49.7 * 0.02 * 0.25, epsilon = 1e-12);

        let status = rm.status();
        assert_eq!(status.open_positions.len(), 2);
        assert_eq!(status.open_positions[0].symbol, "BTCUSDT");
        assert_eq!(status.daily_trade_count, 2);
    }

    #[test]
    fn balance_restored_after_round_trip() {
        let rm = aggressive();
        rm.buy("BTCUSDT", 100.0, weekday_noon(4));
        let trade = rm.sell("BTCUSDT", 100.0, weekday_noon(4));
        assert!(trade.is_filled());
        assert_relative_eq!(rm.state().balance, 50.0, epsilon = 1e-12);
        assert!((rm.status().win_rate).abs() < f64::EPSILON);
    }
}

mod live_cycles {
    use super::*;

    fn live_trader(port: Arc<MockDataPort>) -> LiveTrader {
        LiveTrader::new(
            port,
            Arc::new(RiskManager::new(RiskConfig::default()).unwrap()),
            Arc::new(band()),
            small_engine(),
            LiveConfig {
                symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
                lookback: 20,
                ..LiveConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn entry_then_trailing_exit() {
        let port = Arc::new(
            MockDataPort::new()
                .with_bars("BTCUSDT", make_bars(&[105.0, 102.0, 98.0]))
                .with_bars("ETHUSDT", make_bars(&[105.0, 104.0, 103.0])),
        );
        let trader = live_trader(Arc::clone(&port));

        let report = trader.signal_cycle(weekday_noon(4)).unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(trader.risk().open_symbols(), vec!["BTCUSDT"]);

        // +3% activates trailing, then a pullback below the raised stop
        port.set_price("BTCUSDT", 98.0 * 1.03);
        assert!(trader.monitor_cycle(weekday_noon(4)).unwrap().exits.is_empty());
        port.set_price("BTCUSDT", 97.5);
        let report = trader.monitor_cycle(weekday_noon(4)).unwrap();
        assert_eq!(report.exits.len(), 1);
        assert_eq!(report.exits[0].reason, Some(ExitReason::TrailingStop));
        assert!(trader.status().open_positions.is_empty());
    }

    #[test]
    fn one_failing_symbol_does_not_abort_cycle() {
        let port = Arc::new(
            MockDataPort::new()
                .with_bars("BTCUSDT", make_bars(&[105.0, 102.0, 98.0]))
                .with_error("ETHUSDT", "connection reset"),
        );
        let trader = live_trader(port);
        let report = trader.signal_cycle(weekday_noon(4)).unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(trader.risk().open_symbols(), vec!["BTCUSDT"]);
    }

    #[test]
    fn build_live_trader_from_config() {
        let config = trader_config("[live]\nsymbols = BTCUSDT\nlookback = 60\n");
        let port = Arc::new(MockDataPort::new());
        let trader = cli::build_live_trader(&config, port).unwrap();
        assert!((trader.status().balance - 50.0).abs() < f64::EPSILON);
    }
}

mod csv_backtest {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn csv_to_json_report() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let csv = CsvAdapter::new(data_dir.clone());
        csv.save_bars("BTCUSDT", &make_bars(&[105.0, 105.0, 90.0, 117.0, 95.0, 112.0]))
            .unwrap();

        let mut config = trader_config("");
        config.indicators = small_indicator_config();
        let report =
            cli::backtest_symbols(&csv, &config, &["BTCUSDT".to_string()], &band()).unwrap();
        assert_eq!(report.results["BTCUSDT"].total_trades, 2);

        let output = dir.path().join("out/report.json");
        JsonReportAdapter::full().write(&report, &output).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(doc["symbols"]["BTCUSDT"]["trades"].as_array().unwrap().len(), 4);
        assert_eq!(doc["comparison"]["best"]["symbol"], "BTCUSDT");
    }
}
