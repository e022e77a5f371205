//! Risk parameters, process-wide counters and the entry gates.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;
use std::fmt;

use crate::domain::error::PapertraderError;
use crate::domain::portfolio::PortfolioAllocation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    #[default]
    Daily,
    Hourly,
}

impl std::str::FromStr for ResetPeriod {
    type Err = PapertraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(ResetPeriod::Daily),
            "hourly" | "hour" => Ok(ResetPeriod::Hourly),
            other => Err(PapertraderError::invalid(
                "trader",
                "reset_period",
                format!("expected daily or hourly, got '{other}'"),
            )),
        }
    }
}

/// Identifies the window the daily counters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PeriodKey {
    pub date: NaiveDate,
    pub hour: Option<u32>,
}

impl PeriodKey {
    pub fn of(at: NaiveDateTime, period: ResetPeriod) -> Self {
        PeriodKey {
            date: at.date(),
            hour: match period {
                ResetPeriod::Daily => None,
                ResetPeriod::Hourly => Some(at.hour()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub initial_capital: f64,
    /// Fraction of balance committed per entry, before the portfolio weight.
    pub position_size: f64,
    pub max_daily_trades: u32,
    /// Fraction of initial capital that may be lost within one period.
    pub max_daily_loss: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub trailing_stop: f64,
    pub trailing_activation: f64,
    pub use_trailing_stop: bool,
    /// Local hour trading opens, inclusive.
    pub trading_start_hour: u32,
    /// Local hour trading closes, exclusive. Below the start hour the window
    /// wraps past midnight.
    pub trading_end_hour: u32,
    pub weekend_trading: bool,
    pub reset_period: ResetPeriod,
    pub portfolio: PortfolioAllocation,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            initial_capital: 50.0,
            position_size: 0.02,
            max_daily_trades: 5,
            max_daily_loss: 0.05,
            stop_loss: 0.015,
            take_profit: 0.04,
            trailing_stop: 0.03,
            trailing_activation: 0.02,
            use_trailing_stop: true,
            trading_start_hour: 0,
            trading_end_hour: 24,
            weekend_trading: true,
            reset_period: ResetPeriod::Daily,
            portfolio: PortfolioAllocation::new(),
        }
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), PapertraderError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PapertraderError::invalid(
            "trader",
            key,
            format!("{key} must be a non-negative number, got {value}"),
        ));
    }
    Ok(())
}

fn fraction_below_one(key: &str, value: f64) -> Result<(), PapertraderError> {
    non_negative(key, value)?;
    if value >= 1.0 {
        return Err(PapertraderError::invalid(
            "trader",
            key,
            format!("{key} must be below 1, got {value}"),
        ));
    }
    Ok(())
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), PapertraderError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(PapertraderError::invalid(
                "trader",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
        if !self.position_size.is_finite() || self.position_size <= 0.0 || self.position_size > 1.0
        {
            return Err(PapertraderError::invalid(
                "trader",
                "position_size",
                "position_size must be in (0, 1]",
            ));
        }
        non_negative("max_daily_loss", self.max_daily_loss)?;
        fraction_below_one("stop_loss", self.stop_loss)?;
        non_negative("take_profit", self.take_profit)?;
        fraction_below_one("trailing_stop", self.trailing_stop)?;
        non_negative("trailing_activation", self.trailing_activation)?;
        if self.trading_start_hour > 23 {
            return Err(PapertraderError::invalid(
                "trader",
                "trading_start_hour",
                "trading_start_hour must be within 0..=23",
            ));
        }
        if self.trading_end_hour > 24 || self.trading_end_hour == self.trading_start_hour {
            return Err(PapertraderError::invalid(
                "trader",
                "trading_end_hour",
                "trading_end_hour must be within 0..=24 and differ from the start hour",
            ));
        }
        Ok(())
    }

    pub fn within_trading_hours(&self, at: NaiveDateTime) -> bool {
        let hour = at.hour();
        let (start, end) = (self.trading_start_hour, self.trading_end_hour);
        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Loss within one period that closes the gate.
    pub fn daily_loss_limit(&self) -> f64 {
        self.max_daily_loss * self.initial_capital
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateRejection {
    OutsideTradingHours,
    Weekend,
    DailyTradeLimit,
    DailyLossLimit,
    InsufficientBalance,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateRejection::OutsideTradingHours => "outside trading hours",
            GateRejection::Weekend => "weekend trading disabled",
            GateRejection::DailyTradeLimit => "daily trade limit reached",
            GateRejection::DailyLossLimit => "daily loss limit reached",
            GateRejection::InsufficientBalance => "insufficient balance",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    pub balance: f64,
    pub daily_trade_count: u32,
    pub daily_pnl: f64,
    /// Entries since start.
    pub total_trades: u32,
    /// Closes since start.
    pub closed_trades: u32,
    /// Closes with a positive profit since start.
    pub winning_trades: u32,
    pub last_reset_period: Option<PeriodKey>,
}

impl RiskState {
    pub fn new(initial_capital: f64) -> Self {
        RiskState {
            balance: initial_capital,
            daily_trade_count: 0,
            daily_pnl: 0.0,
            total_trades: 0,
            closed_trades: 0,
            winning_trades: 0,
            last_reset_period: None,
        }
    }

    /// Clears the period counters when `at` falls in a new period.
    /// Returns true on a reset.
    pub fn roll_period(&mut self, at: NaiveDateTime, period: ResetPeriod) -> bool {
        let key = PeriodKey::of(at, period);
        if self.last_reset_period == Some(key) {
            return false;
        }
        let reset = self.last_reset_period.is_some();
        self.daily_trade_count = 0;
        self.daily_pnl = 0.0;
        self.last_reset_period = Some(key);
        reset
    }

    /// Winning closes as a percentage of all closes.
    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.closed_trades as f64 * 100.0
        }
    }

    /// Entry gates in fixed order; the first failure is returned. The
    /// period must already be rolled for `at`.
    pub fn check_gates(&self, config: &RiskConfig, at: NaiveDateTime) -> Result<(), GateRejection> {
        if !config.within_trading_hours(at) {
            return Err(GateRejection::OutsideTradingHours);
        }
        if !config.weekend_trading && matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return Err(GateRejection::Weekend);
        }
        if self.daily_trade_count >= config.max_daily_trades {
            return Err(GateRejection::DailyTradeLimit);
        }
        if self.daily_pnl < 0.0 && -self.daily_pnl >= config.daily_loss_limit() {
            return Err(GateRejection::DailyLossLimit);
        }
        Ok(())
    }
}
