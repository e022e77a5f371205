//! Configuration loading and validation.
//!
//! Builds a fully validated [`TraderConfig`] from a [`ConfigPort`]. Every key
//! is optional; a present key that does not parse is an error rather than a
//! silent fallback to the default.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::PapertraderError;
use crate::domain::indicator::{IndicatorConfig, MovingAverageSpec};
use crate::domain::portfolio::PortfolioAllocation;
use crate::domain::risk::{ResetPeriod, RiskConfig};
use crate::domain::signal::{EnsembleScorer, ScorerConfig, SignalSource, WeightTable, WeightedScorer};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScorerKind {
    #[default]
    Weighted,
    Ensemble,
}

impl FromStr for ScorerKind {
    type Err = PapertraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(ScorerKind::Weighted),
            "ensemble" => Ok(ScorerKind::Ensemble),
            other => Err(PapertraderError::invalid(
                "signal",
                "scorer",
                format!("expected weighted or ensemble, got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalSettings {
    pub kind: ScorerKind,
    /// Required for [`ScorerKind::Ensemble`].
    pub model_path: Option<PathBuf>,
    pub scorer: ScorerConfig,
}

impl SignalSettings {
    /// The configured scorer; loads the model file for the ensemble.
    pub fn build_source(&self) -> Result<Arc<dyn SignalSource>, PapertraderError> {
        match (self.kind, &self.model_path) {
            (ScorerKind::Weighted, _) => Ok(Arc::new(WeightedScorer::new(self.scorer.clone())?)),
            (ScorerKind::Ensemble, Some(path)) => Ok(Arc::new(EnsembleScorer::from_file(path)?)),
            (ScorerKind::Ensemble, None) => Err(PapertraderError::ConfigMissing {
                section: "signal".to_string(),
                key: "model_path".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub commission: f64,
    pub data_dir: Option<PathBuf>,
    pub interval: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub symbols: Vec<String>,
    pub interval: String,
    /// Bars fetched per signal cycle.
    pub lookback: usize,
    pub price_poll: Duration,
    pub ohlcv_poll: Duration,
    pub monitor_poll: Duration,
    /// Sleep after a failed loop iteration.
    pub backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            symbols: Vec::new(),
            interval: "1h".to_string(),
            lookback: 100,
            price_poll: Duration::from_secs(30),
            ohlcv_poll: Duration::from_secs(1800),
            monitor_poll: Duration::from_secs(60),
            backoff: Duration::from_secs(300),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl LiveConfig {
    /// A signal cycle must fetch more bars than the indicator warm-up.
    pub fn check_lookback(&self, warmup: usize) -> Result<(), PapertraderError> {
        if self.lookback <= warmup {
            return Err(PapertraderError::invalid(
                "live",
                "lookback",
                format!(
                    "lookback {} does not cover the indicator warm-up of {} bars",
                    self.lookback, warmup
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraderConfig {
    pub risk: RiskConfig,
    pub indicators: IndicatorConfig,
    pub signal: SignalSettings,
    pub backtest: BacktestSettings,
    pub live: LiveConfig,
}

impl TraderConfig {
    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            initial_balance: self.risk.initial_capital,
            commission_rate: self.backtest.commission,
        }
    }
}

pub fn build_trader_config(config: &dyn ConfigPort) -> Result<TraderConfig, PapertraderError> {
    let risk = build_risk_config(config)?;
    let indicators = build_indicator_config(config)?;
    let signal = build_signal_settings(config)?;
    check_scorer_inputs(&signal.scorer, &indicators)?;

    let backtest = BacktestSettings {
        commission: read_parsed(config, "backtest", "commission", 0.001)?,
        data_dir: config.get_string("backtest", "data_dir").map(PathBuf::from),
        interval: config
            .get_string("backtest", "interval")
            .unwrap_or_else(|| "1d".to_string()),
        symbols: read_symbols(config, "backtest")?.unwrap_or_else(|| risk.portfolio.symbols()),
    };
    BacktestConfig {
        initial_balance: risk.initial_capital,
        commission_rate: backtest.commission,
    }
    .validate()?;

    let live = build_live_config(config, &risk)?;

    Ok(TraderConfig {
        risk,
        indicators,
        signal,
        backtest,
        live,
    })
}

fn build_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, PapertraderError> {
    let d = RiskConfig::default();
    let risk = RiskConfig {
        initial_capital: read_parsed(config, "trader", "initial_capital", d.initial_capital)?,
        position_size: read_parsed(config, "trader", "position_size", d.position_size)?,
        max_daily_trades: read_parsed(config, "trader", "max_daily_trades", d.max_daily_trades)?,
        max_daily_loss: read_parsed(config, "trader", "max_daily_loss", d.max_daily_loss)?,
        stop_loss: read_parsed(config, "trader", "stop_loss", d.stop_loss)?,
        take_profit: read_parsed(config, "trader", "take_profit", d.take_profit)?,
        trailing_stop: read_parsed(config, "trader", "trailing_stop", d.trailing_stop)?,
        trailing_activation: read_parsed(
            config,
            "trader",
            "trailing_activation",
            d.trailing_activation,
        )?,
        use_trailing_stop: read_bool(config, "trader", "use_trailing_stop", d.use_trailing_stop)?,
        trading_start_hour: read_parsed(
            config,
            "trader",
            "trading_start_hour",
            d.trading_start_hour,
        )?,
        trading_end_hour: read_parsed(config, "trader", "trading_end_hour", d.trading_end_hour)?,
        weekend_trading: read_bool(config, "trader", "weekend_trading", d.weekend_trading)?,
        reset_period: match config.get_string("trader", "reset_period") {
            Some(v) => v.parse::<ResetPeriod>()?,
            None => d.reset_period,
        },
        portfolio: build_portfolio(config)?,
    };
    risk.validate()?;
    Ok(risk)
}

fn build_portfolio(config: &dyn ConfigPort) -> Result<PortfolioAllocation, PapertraderError> {
    let mut portfolio = PortfolioAllocation::new();
    for (symbol, value) in config.section_entries("portfolio") {
        let weight = parse_value::<f64>("portfolio", &symbol, &value)?;
        portfolio.set(&symbol, weight)?;
    }
    Ok(portfolio)
}

fn build_indicator_config(config: &dyn ConfigPort) -> Result<IndicatorConfig, PapertraderError> {
    let d = IndicatorConfig::default();
    let indicators = IndicatorConfig {
        moving_averages: match config.get_string("indicators", "moving_averages") {
            Some(v) => parse_moving_averages(&v)?,
            None => d.moving_averages,
        },
        rsi_period: read_parsed(config, "indicators", "rsi_period", d.rsi_period)?,
        momentum_horizons: match config.get_string("indicators", "momentum") {
            Some(v) => split_list(&v)
                .map(|h| parse_value::<usize>("indicators", "momentum", h))
                .collect::<Result<Vec<_>, _>>()?,
            None => d.momentum_horizons,
        },
        volatility_window: read_parsed(
            config,
            "indicators",
            "volatility_window",
            d.volatility_window,
        )?,
        volume_window: read_parsed(config, "indicators", "volume_window", d.volume_window)?,
        percentile_window: read_parsed(
            config,
            "indicators",
            "percentile_window",
            d.percentile_window,
        )?,
        volatility_percentile: read_parsed(
            config,
            "indicators",
            "volatility_percentile",
            d.volatility_percentile,
        )?,
    };
    indicators.validate()?;
    Ok(indicators)
}

/// `short:5,medium:10,long:30`
pub fn parse_moving_averages(value: &str) -> Result<Vec<MovingAverageSpec>, PapertraderError> {
    split_list(value)
        .map(|item| {
            let (name, period) = item.split_once(':').ok_or_else(|| {
                PapertraderError::invalid(
                    "indicators",
                    "moving_averages",
                    format!("expected name:period, got '{item}'"),
                )
            })?;
            let period = parse_value::<usize>("indicators", "moving_averages", period)?;
            Ok(MovingAverageSpec::new(name.trim(), period))
        })
        .collect()
}

fn build_signal_settings(config: &dyn ConfigPort) -> Result<SignalSettings, PapertraderError> {
    let d = ScorerConfig::default();
    let entries = config.section_entries("weights");
    let weights = if entries.is_empty() {
        d.weights
    } else {
        let parsed = entries
            .into_iter()
            .map(|(key, value)| {
                let weight = parse_value::<f64>("weights", &key, &value)?;
                Ok((key, weight))
            })
            .collect::<Result<Vec<_>, PapertraderError>>()?;
        WeightTable::from_entries(parsed)?
    };

    let scorer = ScorerConfig {
        buy_threshold: read_parsed(config, "signal", "buy_threshold", d.buy_threshold)?,
        sell_threshold: read_parsed(config, "signal", "sell_threshold", d.sell_threshold)?,
        rsi_oversold: read_parsed(config, "signal", "rsi_oversold", d.rsi_oversold)?,
        rsi_overbought: read_parsed(config, "signal", "rsi_overbought", d.rsi_overbought)?,
        momentum_horizon: read_parsed(config, "signal", "momentum_horizon", d.momentum_horizon)?,
        momentum_threshold: read_parsed(
            config,
            "signal",
            "momentum_threshold",
            d.momentum_threshold,
        )?,
        volume_spike: read_parsed(config, "signal", "volume_spike", d.volume_spike)?,
        trend_short: config
            .get_string("signal", "trend_short")
            .unwrap_or(d.trend_short),
        trend_medium: config
            .get_string("signal", "trend_medium")
            .unwrap_or(d.trend_medium),
        trend_long: config.get_string("signal", "trend_long").unwrap_or(d.trend_long),
        weights,
    };
    scorer.validate()?;

    let kind = match config.get_string("signal", "scorer") {
        Some(v) => v.parse::<ScorerKind>()?,
        None => ScorerKind::default(),
    };
    let model_path = config.get_string("signal", "model_path").map(PathBuf::from);
    if kind == ScorerKind::Ensemble && model_path.is_none() {
        return Err(PapertraderError::ConfigMissing {
            section: "signal".to_string(),
            key: "model_path".to_string(),
        });
    }

    Ok(SignalSettings {
        kind,
        model_path,
        scorer,
    })
}

/// The weighted scorer reads named averages and one momentum horizon; both
/// must be produced by the indicator engine or every signal would be HOLD.
fn check_scorer_inputs(
    scorer: &ScorerConfig,
    indicators: &IndicatorConfig,
) -> Result<(), PapertraderError> {
    for (key, name) in [
        ("trend_short", &scorer.trend_short),
        ("trend_medium", &scorer.trend_medium),
        ("trend_long", &scorer.trend_long),
    ] {
        if !indicators.moving_averages.iter().any(|m| &m.name == name) {
            return Err(PapertraderError::invalid(
                "signal",
                key,
                format!("moving average '{name}' is not configured in [indicators]"),
            ));
        }
    }
    if !indicators.momentum_horizons.contains(&scorer.momentum_horizon) {
        return Err(PapertraderError::invalid(
            "signal",
            "momentum_horizon",
            format!(
                "horizon {} is not configured in [indicators] momentum",
                scorer.momentum_horizon
            ),
        ));
    }
    Ok(())
}

fn build_live_config(
    config: &dyn ConfigPort,
    risk: &RiskConfig,
) -> Result<LiveConfig, PapertraderError> {
    let d = LiveConfig::default();
    let secs = |key: &str, default: Duration| -> Result<Duration, PapertraderError> {
        let value: u64 = read_parsed(config, "live", key, default.as_secs())?;
        if value == 0 {
            return Err(PapertraderError::invalid("live", key, "interval must be at least 1 second"));
        }
        Ok(Duration::from_secs(value))
    };

    Ok(LiveConfig {
        symbols: read_symbols(config, "live")?.unwrap_or_else(|| risk.portfolio.symbols()),
        interval: config.get_string("live", "interval").unwrap_or(d.interval),
        lookback: read_parsed(config, "live", "lookback", d.lookback)?,
        price_poll: secs("price_poll_secs", d.price_poll)?,
        ohlcv_poll: secs("ohlcv_poll_secs", d.ohlcv_poll)?,
        monitor_poll: secs("monitor_poll_secs", d.monitor_poll)?,
        backoff: secs("backoff_secs", d.backoff)?,
        request_timeout: secs("request_timeout_secs", d.request_timeout)?,
    })
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn read_symbols(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<Option<Vec<String>>, PapertraderError> {
    let Some(value) = config.get_string(section, "symbols") else {
        return Ok(None);
    };
    let symbols: Vec<String> = split_list(&value).map(str::to_ascii_uppercase).collect();
    if symbols.is_empty() {
        return Err(PapertraderError::invalid(section, "symbols", "symbol list is empty"));
    }
    Ok(Some(symbols))
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, PapertraderError> {
    value.trim().parse::<T>().map_err(|_| {
        PapertraderError::invalid(
            section,
            key,
            format!("cannot parse '{}' as {}", value.trim(), std::any::type_name::<T>()),
        )
    })
}

fn read_parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, PapertraderError> {
    match config.get_string(section, key) {
        Some(value) => parse_value(section, key, &value),
        None => Ok(default),
    }
}

fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, PapertraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            other => Err(PapertraderError::invalid(
                section,
                key,
                format!("expected a boolean, got '{other}'"),
            )),
        },
    }
}
