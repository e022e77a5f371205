//! Live paper-trading loops.
//!
//! Three independent loops share one [`RiskManager`]: a price ticker, an
//! OHLCV refresh that scores signals and a position monitor. Each cycle is
//! also callable directly with an explicit `now`, which is how the CLI smoke
//! mode and the tests drive it.

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::config_validation::LiveConfig;
use crate::domain::error::PapertraderError;
use crate::domain::execution::{Execution, RiskManager, RiskStatus};
use crate::domain::indicator::IndicatorEngine;
use crate::domain::position::Trade;
use crate::domain::signal::SignalSource;
use crate::ports::data_port::MarketDataPort;

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// What one cycle did across all symbols.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub failed: usize,
    pub executions: Vec<(String, Execution)>,
    pub exits: Vec<Trade>,
}

impl CycleReport {
    fn record_failure(&mut self, symbol: &str, err: PapertraderError, last: &mut Option<PapertraderError>) {
        warn!(symbol, error = %err, "symbol skipped this cycle");
        self.failed += 1;
        *last = Some(err);
    }

    /// Every attempted symbol failed; treated as a feed outage.
    fn into_result(self, last: Option<PapertraderError>) -> Result<Self, PapertraderError> {
        match last {
            Some(err) if self.evaluated == 0 && self.failed > 0 => Err(err),
            _ => Ok(self),
        }
    }
}

pub struct LiveTrader {
    data: Arc<dyn MarketDataPort>,
    risk: Arc<RiskManager>,
    source: Arc<dyn SignalSource>,
    engine: IndicatorEngine,
    config: LiveConfig,
    last_prices: Mutex<HashMap<String, f64>>,
}

impl LiveTrader {
    pub fn new(
        data: Arc<dyn MarketDataPort>,
        risk: Arc<RiskManager>,
        source: Arc<dyn SignalSource>,
        engine: IndicatorEngine,
        config: LiveConfig,
    ) -> Result<Self, PapertraderError> {
        if config.symbols.is_empty() {
            return Err(PapertraderError::invalid(
                "live",
                "symbols",
                "at least one symbol is required",
            ));
        }
        config.check_lookback(engine.warmup_len())?;
        Ok(LiveTrader {
            data,
            risk,
            source,
            engine,
            config,
            last_prices: Mutex::new(HashMap::new()),
        })
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn status(&self) -> RiskStatus {
        self.risk.status()
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.lock().get(symbol).copied()
    }

    /// Fetches bars for every symbol, scores the latest snapshot and applies
    /// the signal at the last close.
    pub fn signal_cycle(&self, now: NaiveDateTime) -> Result<CycleReport, PapertraderError> {
        let mut report = CycleReport::default();
        let mut last_err = None;

        for symbol in &self.config.symbols {
            let bars = match self
                .data
                .fetch_ohlcv(symbol, &self.config.interval, self.config.lookback)
            {
                Ok(bars) => bars,
                Err(e) => {
                    report.record_failure(symbol, e, &mut last_err);
                    continue;
                }
            };
            let Some(last) = bars.last() else {
                let e = PapertraderError::data_unavailable(symbol, "no bars");
                report.record_failure(symbol, e, &mut last_err);
                continue;
            };

            let signal = self.source.score_latest(&self.engine.compute(&bars));
            report.evaluated += 1;
            debug!(
                symbol,
                source = self.source.name(),
                action = %signal.action,
                confidence = signal.confidence,
                "signal scored"
            );

            let execution = self.risk.apply(symbol, &signal, last.close, now);
            if let Execution::Filled(trade) = &execution {
                info!(symbol, kind = ?trade.kind, price = trade.price, "signal executed");
            }
            report.executions.push((symbol.clone(), execution));
        }

        report.into_result(last_err)
    }

    /// Refreshes the last price of every symbol and runs the trailing-stop
    /// and exit checks for the ones with an open position.
    pub fn price_cycle(&self, now: NaiveDateTime) -> Result<CycleReport, PapertraderError> {
        let mut report = CycleReport::default();
        let mut last_err = None;

        for symbol in &self.config.symbols {
            match self.data.fetch_last_price(symbol) {
                Ok(price) => {
                    self.last_prices.lock().insert(symbol.clone(), price);
                    report.evaluated += 1;
                    if let Some(trade) = self.risk.monitor(symbol, price, now) {
                        report.exits.push(trade);
                    }
                }
                Err(e) => report.record_failure(symbol, e, &mut last_err),
            }
        }

        report.into_result(last_err)
    }

    /// Runs trailing-stop and exit checks for every open position at its
    /// latest price. When the fetch fails the ticker's last price is used.
    pub fn monitor_cycle(&self, now: NaiveDateTime) -> Result<CycleReport, PapertraderError> {
        let mut report = CycleReport::default();
        let mut last_err = None;

        for symbol in self.risk.open_symbols() {
            let price = match self.data.fetch_last_price(&symbol) {
                Ok(price) => {
                    self.last_prices.lock().insert(symbol.clone(), price);
                    price
                }
                Err(e) => match self.last_price(&symbol) {
                    Some(cached) => {
                        warn!(symbol, error = %e, price = cached, "fetch failed, using ticker price");
                        cached
                    }
                    None => {
                        report.record_failure(&symbol, e, &mut last_err);
                        continue;
                    }
                },
            };
            report.evaluated += 1;
            if let Some(trade) = self.risk.monitor(&symbol, price, now) {
                report.exits.push(trade);
            }
        }

        report.into_result(last_err)
    }

    /// Starts the three loops on their own threads. They run until
    /// `shutdown` is set.
    pub fn spawn(self: &Arc<Self>, shutdown: Arc<AtomicBool>) -> std::io::Result<Vec<JoinHandle<()>>> {
        let price = {
            let trader = Arc::clone(self);
            let stop = Arc::clone(&shutdown);
            let interval = self.config.price_poll;
            spawn_loop("price-ticker", interval, self.config.backoff, stop, move || {
                trader.price_cycle(wall_clock())
            })?
        };
        let signal = {
            let trader = Arc::clone(self);
            let stop = Arc::clone(&shutdown);
            let interval = self.config.ohlcv_poll;
            spawn_loop("ohlcv-refresh", interval, self.config.backoff, stop, move || {
                trader.signal_cycle(wall_clock())
            })?
        };
        let monitor = {
            let trader = Arc::clone(self);
            let interval = self.config.monitor_poll;
            spawn_loop("position-monitor", interval, self.config.backoff, shutdown, move || {
                trader.monitor_cycle(wall_clock())
            })?
        };
        Ok(vec![price, signal, monitor])
    }
}

/// Local wall-clock time; trading hours and period keys are local.
pub fn wall_clock() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn spawn_loop<F>(
    name: &'static str,
    interval: Duration,
    backoff: Duration,
    shutdown: Arc<AtomicBool>,
    mut cycle: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() -> Result<CycleReport, PapertraderError> + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(move || {
        info!(loop_name = name, interval_secs = interval.as_secs(), "loop started");
        while !shutdown.load(Ordering::Relaxed) {
            let pause = match cycle() {
                Ok(report) => {
                    debug!(
                        loop_name = name,
                        evaluated = report.evaluated,
                        failed = report.failed,
                        "cycle finished"
                    );
                    interval
                }
                Err(e) => {
                    warn!(
                        loop_name = name,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "cycle failed, backing off"
                    );
                    backoff
                }
            };
            if sleep_unless_shutdown(pause, &shutdown) {
                break;
            }
        }
        info!(loop_name = name, "loop stopped");
    })
}

/// Sleeps in slices; returns true once `shutdown` is set.
pub fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
