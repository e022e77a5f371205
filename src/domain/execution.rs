//! Paper-trade execution under a fixed risk budget.
//!
//! [`RiskManager`] owns the balance, the open-position map, the period
//! counters and the trade log behind one lock. Every public operation takes
//! the lock once, so an entry, a trailing-stop update and the close it may
//! trigger never interleave with another loop's mutation.
//!
//! Per symbol the state machine is FLAT -> OPEN (accepted BUY) -> FLAT (stop,
//! trailing stop, take-profit or SELL signal).

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::domain::error::PapertraderError;
use crate::domain::position::{ExitReason, Position, Trade};
use crate::domain::risk::{GateRejection, RiskConfig, RiskState};
use crate::domain::signal::{Action, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoOpReason {
    /// BUY while a position for the symbol is open.
    AlreadyOpen,
    /// SELL while the symbol is flat.
    NotOpen,
    /// HOLD signal, or a price that cannot be traded.
    NothingToDo,
}

/// Outcome of a BUY/SELL request.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Filled(Trade),
    Rejected(GateRejection),
    NoOp(NoOpReason),
}

impl Execution {
    pub fn is_filled(&self) -> bool {
        matches!(self, Execution::Filled(_))
    }

    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Execution::Filled(trade) => Some(trade),
            _ => None,
        }
    }
}

/// Read-only view for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStatus {
    pub balance: f64,
    /// Sorted by symbol.
    pub open_positions: Vec<Position>,
    pub daily_trade_count: u32,
    pub daily_pnl: f64,
    pub total_trades: u32,
    pub closed_trades: u32,
    pub winning_trades: u32,
    pub win_rate: f64,
    /// Latest fills, oldest first.
    pub recent_trades: Vec<Trade>,
}

#[derive(Debug)]
struct RiskBook {
    state: RiskState,
    positions: HashMap<String, Position>,
    trades: VecDeque<Trade>,
}

impl RiskBook {
    fn record(&mut self, trade: &Trade) {
        if self.trades.len() == TRADE_LOG_CAPACITY {
            self.trades.pop_front();
        }
        self.trades.push_back(trade.clone());
    }
}

#[derive(Debug)]
pub struct RiskManager {
    config: RiskConfig,
    book: Mutex<RiskBook>,
}

/// Fills kept in the trade log; older ones are dropped.
pub const TRADE_LOG_CAPACITY: usize = 100;

fn tradable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Result<Self, PapertraderError> {
        config.validate()?;
        let state = RiskState::new(config.initial_capital);
        Ok(RiskManager {
            config,
            book: Mutex::new(RiskBook {
                state,
                positions: HashMap::new(),
                trades: VecDeque::with_capacity(TRADE_LOG_CAPACITY),
            }),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Runs the entry gates for `at`, resetting the period counters first
    /// when `at` starts a new period.
    pub fn can_trade(&self, at: NaiveDateTime) -> Result<(), GateRejection> {
        let mut book = self.book.lock();
        book.state.roll_period(at, self.config.reset_period);
        book.state.check_gates(&self.config, at)
    }

    /// balance * position_size * portfolio weight
    pub fn position_size(&self, symbol: &str) -> f64 {
        let book = self.book.lock();
        self.size_for(&book.state, symbol)
    }

    fn size_for(&self, state: &RiskState, symbol: &str) -> f64 {
        state.balance * self.config.position_size * self.config.portfolio.weight(symbol)
    }

    pub fn buy(&self, symbol: &str, price: f64, at: NaiveDateTime) -> Execution {
        let mut book = self.book.lock();
        if book.positions.contains_key(symbol) {
            debug!(symbol, "buy ignored, position already open");
            return Execution::NoOp(NoOpReason::AlreadyOpen);
        }
        if !tradable(price) {
            debug!(symbol, price, "buy ignored, untradable price");
            return Execution::NoOp(NoOpReason::NothingToDo);
        }

        book.state.roll_period(at, self.config.reset_period);
        if let Err(reason) = book.state.check_gates(&self.config, at) {
            info!(symbol, %reason, "buy rejected");
            return Execution::Rejected(reason);
        }

        let size = self.size_for(&book.state, symbol);
        if size <= 0.0 || size > book.state.balance {
            info!(symbol, size, balance = book.state.balance, "buy rejected, insufficient balance");
            return Execution::Rejected(GateRejection::InsufficientBalance);
        }

        let position = Position::open(
            symbol,
            price,
            size,
            self.config.stop_loss,
            self.config.take_profit,
            at,
        );
        book.state.balance -= size;
        book.state.daily_trade_count += 1;
        book.state.total_trades += 1;

        let trade = Trade::entry(symbol, price, size, at);
        info!(
            symbol,
            price,
            size,
            stop_loss = position.stop_loss_price,
            take_profit = position.take_profit_price,
            balance = book.state.balance,
            "position opened"
        );
        book.positions.insert(symbol.to_string(), position);
        book.record(&trade);
        Execution::Filled(trade)
    }

    /// Manual exit; goes through the same gates as an entry.
    pub fn sell(&self, symbol: &str, price: f64, at: NaiveDateTime) -> Execution {
        let mut book = self.book.lock();
        if !book.positions.contains_key(symbol) {
            debug!(symbol, "sell ignored, no open position");
            return Execution::NoOp(NoOpReason::NotOpen);
        }
        if !tradable(price) {
            debug!(symbol, price, "sell ignored, untradable price");
            return Execution::NoOp(NoOpReason::NothingToDo);
        }

        book.state.roll_period(at, self.config.reset_period);
        if let Err(reason) = book.state.check_gates(&self.config, at) {
            info!(symbol, %reason, "sell rejected");
            return Execution::Rejected(reason);
        }

        match Self::close_locked(&mut book, symbol, price, ExitReason::ManualExit, at) {
            Some(trade) => Execution::Filled(trade),
            None => Execution::NoOp(NoOpReason::NotOpen),
        }
    }

    /// Routes a signal to [`Self::buy`] or [`Self::sell`]; HOLD does nothing.
    pub fn apply(&self, symbol: &str, signal: &Signal, price: f64, at: NaiveDateTime) -> Execution {
        match signal.action {
            Action::Buy => self.buy(symbol, price, at),
            Action::Sell => self.sell(symbol, price, at),
            Action::Hold => Execution::NoOp(NoOpReason::NothingToDo),
        }
    }

    /// One monitoring tick: trailing-stop update, then stop and take-profit
    /// checks. Exits here bypass the entry gates.
    pub fn monitor(&self, symbol: &str, price: f64, at: NaiveDateTime) -> Option<Trade> {
        if !tradable(price) {
            return None;
        }
        let mut book = self.book.lock();
        let position = book.positions.get_mut(symbol)?;

        if self.config.use_trailing_stop {
            let raised = position.update_trailing(
                price,
                self.config.trailing_stop,
                self.config.trailing_activation,
            );
            if raised {
                debug!(symbol, stop = position.stop_loss_price, "trailing stop raised");
            }
        }

        let reason = position.exit_reason(price)?;
        book.state.roll_period(at, self.config.reset_period);
        Self::close_locked(&mut book, symbol, price, reason, at)
    }

    fn close_locked(
        book: &mut RiskBook,
        symbol: &str,
        price: f64,
        reason: ExitReason,
        at: NaiveDateTime,
    ) -> Option<Trade> {
        let position = book.positions.remove(symbol)?;
        let ratio = position.profit_ratio(price);
        let trade = Trade::exit(symbol, price, position.size, ratio, reason, at);
        let amount = trade.profit_amount.unwrap_or(0.0);

        book.state.balance += position.size + amount;
        book.state.daily_pnl += amount;
        book.state.closed_trades += 1;
        if amount > 0.0 {
            book.state.winning_trades += 1;
        }
        info!(
            symbol,
            price,
            %reason,
            profit = amount,
            balance = book.state.balance,
            "position closed"
        );
        book.record(&trade);
        Some(trade)
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.book.lock().positions.get(symbol).cloned()
    }

    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.book.lock().positions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// The trade log, oldest first.
    pub fn trades(&self) -> Vec<Trade> {
        self.book.lock().trades.iter().cloned().collect()
    }

    pub fn state(&self) -> RiskState {
        self.book.lock().state.clone()
    }

    pub fn status(&self) -> RiskStatus {
        let book = self.book.lock();
        let mut open_positions: Vec<Position> = book.positions.values().cloned().collect();
        open_positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        RiskStatus {
            balance: book.state.balance,
            open_positions,
            daily_trade_count: book.state.daily_trade_count,
            daily_pnl: book.state.daily_pnl,
            total_trades: book.state.total_trades,
            closed_trades: book.state.closed_trades,
            winning_trades: book.state.winning_trades,
            win_rate: book.state.win_rate(),
            recent_trades: book.trades.iter().cloned().collect(),
        }
    }
}
