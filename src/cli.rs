//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{require_history, run_backtest};
use crate::domain::config_validation::{TraderConfig, build_trader_config};
use crate::domain::error::PapertraderError;
use crate::domain::execution::RiskManager;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::metrics::BacktestReport;
use crate::domain::signal::SignalSource;
use crate::live::{LiveTrader, sleep_unless_shutdown, wall_clock};
use crate::obs;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "papertrader", about = "Crypto paper-trading bot and backtester")]
pub struct Cli {
    /// Log filter, e.g. `info` or `papertrader=debug`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// `text` or `json`
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay history through the configured scorer
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides `[backtest] symbols`; repeatable
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        /// Overrides `[backtest] data_dir`
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Download history from Binance into the data directory first
        #[arg(long)]
        download: bool,
        /// Years of history to download
        #[arg(long, default_value_t = 7)]
        years: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include trades and equity curves in the report
        #[arg(long)]
        full: bool,
    },
    /// Parse and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the live paper-trading loops
    Live {
        #[arg(short, long)]
        config: PathBuf,
        /// Run this many synchronous cycles, print the status and exit
        #[arg(long)]
        cycles: Option<u32>,
        /// Stop the loops after this many seconds
        #[arg(long)]
        run_for: Option<u64>,
        /// Read bars and prices from CSV files instead of Binance
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    if let Err(e) = obs::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    match cli.command {
        Command::Backtest {
            config,
            symbols,
            data_dir,
            download,
            years,
            output,
            full,
        } => run_backtest_command(
            &config,
            &symbols,
            data_dir.as_deref(),
            download.then_some(years),
            output.as_deref(),
            full,
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Live {
            config,
            cycles,
            run_for,
            data_dir,
        } => run_live(&config, cycles, run_for, data_dir.as_deref()),
    }
}

fn fail(e: PapertraderError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn load_config(path: &Path) -> Result<TraderConfig, PapertraderError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    build_trader_config(&adapter)
}

/// Command-line symbols win over the configured list.
pub fn resolve_symbols(overrides: &[String], config: &TraderConfig) -> Vec<String> {
    if overrides.is_empty() {
        return config.backtest.symbols.clone();
    }
    overrides
        .iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Backtests every symbol with enough history. Symbols whose data cannot be
/// loaded or is too short are skipped with a warning.
pub fn backtest_symbols(
    data: &dyn MarketDataPort,
    config: &TraderConfig,
    symbols: &[String],
    source: &dyn SignalSource,
) -> Result<BacktestReport, PapertraderError> {
    let engine = IndicatorEngine::new(config.indicators.clone())?;
    let bt_config = config.backtest_config();
    let mut report = BacktestReport::new();

    for symbol in symbols {
        let bars = match data.fetch_ohlcv(symbol, &config.backtest.interval, usize::MAX) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol");
                continue;
            }
        };
        if let Err(e) = require_history(symbol, &bars, &engine) {
            warn!(symbol = %symbol, error = %e, "skipping symbol");
            continue;
        }
        info!(symbol = %symbol, bars = bars.len(), source = source.name(), "backtesting");
        let result = run_backtest(symbol, &bars, &bt_config, &engine, source)?;
        report.insert(symbol, result);
    }

    if report.results.is_empty() {
        return Err(PapertraderError::data_unavailable(
            &symbols.join(","),
            "no symbol had enough history to backtest",
        ));
    }
    Ok(report)
}

pub fn print_summary(report: &BacktestReport) {
    eprintln!("\n=== Backtest Results ===");
    for (symbol, summary) in report.summaries() {
        eprintln!("{symbol}:");
        eprintln!(
            "  Balance:        {:.2} -> {:.2}",
            summary.initial_balance, summary.final_balance
        );
        eprintln!("  Total Return:   {:.2}%", summary.total_return_percent);
        eprintln!("  Trades:         {}", summary.total_trades);
        eprintln!("  Win Rate:       {:.1}%", summary.win_rate);
        eprintln!("  Max Drawdown:   -{:.1}%", summary.max_drawdown_percent);
    }

    let Some(cmp) = report.comparison() else {
        return;
    };
    eprintln!("\n=== Comparison ===");
    eprintln!(
        "Best:   {} ({:+.2}%)",
        cmp.best.symbol, cmp.best.total_return_percent
    );
    eprintln!(
        "Worst:  {} ({:+.2}%)",
        cmp.worst.symbol, cmp.worst.total_return_percent
    );
    if cmp.profitable.is_empty() {
        eprintln!("No symbol was both profitable and above 50% win rate");
    } else {
        eprintln!("Profitable:");
        for r in &cmp.profitable {
            eprintln!(
                "  {}  {:+.2}%  {:.1}% win rate",
                r.symbol, r.total_return_percent, r.win_rate
            );
        }
    }
}

fn run_backtest_command(
    config_path: &Path,
    symbol_overrides: &[String],
    data_dir_override: Option<&Path>,
    download_years: Option<u32>,
    output_path: Option<&Path>,
    full: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let symbols = resolve_symbols(symbol_overrides, &config);
    if symbols.is_empty() {
        return fail(PapertraderError::ConfigMissing {
            section: "backtest".into(),
            key: "symbols".into(),
        });
    }

    let data_dir = match data_dir_override
        .map(Path::to_path_buf)
        .or_else(|| config.backtest.data_dir.clone())
    {
        Some(dir) => dir,
        None if download_years.is_some() => PathBuf::from("data"),
        None => {
            return fail(PapertraderError::ConfigMissing {
                section: "backtest".into(),
                key: "data_dir".into(),
            });
        }
    };
    let csv = CsvAdapter::new(data_dir);

    if let Some(years) = download_years {
        if let Err(e) = download_history(&csv, &config, &symbols, years) {
            return fail(e);
        }
    }

    let source = match config.signal.build_source() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Running backtest: {} symbols, scorer {}",
        symbols.len(),
        source.name()
    );
    let report = match backtest_symbols(&csv, &config, &symbols, source.as_ref()) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    print_summary(&report);

    if let Some(output) = output_path {
        let adapter = if full {
            JsonReportAdapter::full()
        } else {
            JsonReportAdapter::new()
        };
        if let Err(e) = adapter.write(&report, output) {
            return fail(e);
        }
        eprintln!("\nReport written to: {}", output.display());
    }
    ExitCode::SUCCESS
}

#[cfg(feature = "binance")]
fn download_history(
    csv: &CsvAdapter,
    config: &TraderConfig,
    symbols: &[String],
    years: u32,
) -> Result<(), PapertraderError> {
    use crate::adapters::binance_adapter::BinanceAdapter;

    let binance = BinanceAdapter::new(config.live.request_timeout)?;
    let end = chrono::Utc::now();
    let start = end - chrono::Duration::days(365 * i64::from(years));
    for symbol in symbols {
        eprintln!("Downloading {symbol}...");
        match binance.download_history(symbol, &config.backtest.interval, start, end) {
            Ok(bars) => {
                let path = csv.save_bars(symbol, &bars)?;
                eprintln!("  {} bars -> {}", bars.len(), path.display());
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "download failed"),
        }
    }
    Ok(())
}

#[cfg(not(feature = "binance"))]
fn download_history(
    _csv: &CsvAdapter,
    _config: &TraderConfig,
    _symbols: &[String],
    _years: u32,
) -> Result<(), PapertraderError> {
    Err(PapertraderError::invalid(
        "backtest",
        "download",
        "the binance feature is required to download history",
    ))
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Err(e) = config.signal.build_source() {
        return fail(e);
    }
    let engine = match IndicatorEngine::new(config.indicators.clone()) {
        Ok(e) => e,
        Err(e) => return fail(e),
    };
    if let Err(e) = config.live.check_lookback(engine.warmup_len()) {
        return fail(e);
    }

    let risk = &config.risk;
    let scorer = &config.signal.scorer;
    println!("[trader]");
    println!("  initial_capital      {}", risk.initial_capital);
    println!("  position_size        {}", risk.position_size);
    println!("  max_daily_trades     {}", risk.max_daily_trades);
    println!("  max_daily_loss       {}", risk.max_daily_loss);
    println!(
        "  stop/take/trailing   {} / {} / {} (activation {}, enabled {})",
        risk.stop_loss,
        risk.take_profit,
        risk.trailing_stop,
        risk.trailing_activation,
        risk.use_trailing_stop
    );
    println!(
        "  trading hours        {:02}-{:02}, weekend {}",
        risk.trading_start_hour, risk.trading_end_hour, risk.weekend_trading
    );
    println!("[signal]");
    println!("  scorer               {:?}", config.signal.kind);
    println!(
        "  thresholds           sell < {} / buy > {}",
        scorer.sell_threshold, scorer.buy_threshold
    );
    println!("  weight rules         {}", scorer.weights.rules().len());
    println!("[indicators]");
    println!("  warm-up bars         {}", engine.warmup_len());
    println!("[portfolio]");
    for symbol in risk.portfolio.symbols() {
        println!("  {symbol:<20} {}", risk.portfolio.weight(&symbol));
    }
    println!("[backtest]");
    println!("  symbols              {}", config.backtest.symbols.join(", "));
    println!("[live]");
    println!("  symbols              {}", config.live.symbols.join(", "));

    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}

fn live_data_port(
    config: &TraderConfig,
    data_dir: Option<&Path>,
) -> Result<Arc<dyn MarketDataPort>, PapertraderError> {
    if let Some(dir) = data_dir {
        return Ok(Arc::new(CsvAdapter::new(dir.to_path_buf())));
    }
    #[cfg(feature = "binance")]
    {
        use crate::adapters::binance_adapter::BinanceAdapter;
        Ok(Arc::new(BinanceAdapter::new(config.live.request_timeout)?))
    }
    #[cfg(not(feature = "binance"))]
    {
        let _ = config;
        Err(PapertraderError::invalid(
            "live",
            "data_dir",
            "--data-dir is required without the binance feature",
        ))
    }
}

pub fn build_live_trader(
    config: &TraderConfig,
    data: Arc<dyn MarketDataPort>,
) -> Result<LiveTrader, PapertraderError> {
    let risk = Arc::new(RiskManager::new(config.risk.clone())?);
    let source = config.signal.build_source()?;
    let engine = IndicatorEngine::new(config.indicators.clone())?;
    LiveTrader::new(data, risk, source, engine, config.live.clone())
}

fn run_live(
    config_path: &Path,
    cycles: Option<u32>,
    run_for: Option<u64>,
    data_dir: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let trader = match live_data_port(&config, data_dir)
        .and_then(|data| build_live_trader(&config, data))
    {
        Ok(t) => Arc::new(t),
        Err(e) => return fail(e),
    };

    eprintln!(
        "Paper trading {} with {:.2} capital",
        config.live.symbols.join(", "),
        config.risk.initial_capital
    );

    match cycles {
        Some(n) => {
            for _ in 0..n {
                // failures are already logged per symbol
                let _ = trader.price_cycle(wall_clock());
                let _ = trader.signal_cycle(wall_clock());
                let _ = trader.monitor_cycle(wall_clock());
            }
        }
        None => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let handles = match trader.spawn(Arc::clone(&shutdown)) {
                Ok(h) => h,
                Err(e) => return fail(e.into()),
            };
            if let Some(secs) = run_for {
                sleep_unless_shutdown(Duration::from_secs(secs), &shutdown);
                shutdown.store(true, Ordering::Relaxed);
            }
            for handle in handles {
                if handle.join().is_err() {
                    eprintln!("error: a trading loop panicked");
                    return ExitCode::from(1);
                }
            }
        }
    }

    match serde_json::to_string_pretty(&trader.status()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(PapertraderError::Report {
            reason: e.to_string(),
        }),
    }
}
