//! Open positions and the trade records they emit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    ManualExit,
    SellFinal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::ManualExit => "MANUAL_EXIT",
            ExitReason::SellFinal => "SELL_FINAL",
        };
        f.write_str(s)
    }
}

/// A long position sized in quote currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    /// Currency committed at entry.
    pub size: f64,
    /// Active stop; raised by the trailing stop, never lowered.
    pub stop_loss_price: f64,
    /// Fixed stop set at entry.
    pub initial_stop_price: f64,
    pub take_profit_price: f64,
    pub high_water_price: f64,
    pub opened_at: NaiveDateTime,
}

impl Position {
    pub fn open(
        symbol: &str,
        entry_price: f64,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
        opened_at: NaiveDateTime,
    ) -> Self {
        let stop = entry_price * (1.0 - stop_loss);
        Position {
            symbol: symbol.to_string(),
            entry_price,
            size,
            stop_loss_price: stop,
            initial_stop_price: stop,
            take_profit_price: entry_price * (1.0 + take_profit),
            high_water_price: entry_price,
            opened_at,
        }
    }

    /// Unrealised return as a fraction of the entry price.
    pub fn profit_ratio(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price
    }

    /// Tracks the high-water mark and ratchets the stop once the high-water
    /// gain reaches `activation`. Returns true when the stop was raised.
    pub fn update_trailing(&mut self, price: f64, trailing: f64, activation: f64) -> bool {
        self.high_water_price = self.high_water_price.max(price);
        if self.profit_ratio(self.high_water_price) < activation {
            return false;
        }
        let candidate = self.high_water_price * (1.0 - trailing);
        if candidate > self.stop_loss_price {
            self.stop_loss_price = candidate;
            true
        } else {
            false
        }
    }

    pub fn is_trailing(&self) -> bool {
        self.stop_loss_price > self.initial_stop_price
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        price <= self.stop_loss_price
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        price >= self.take_profit_price
    }

    /// Stop checks take priority over take-profit.
    pub fn exit_reason(&self, price: f64) -> Option<ExitReason> {
        if self.should_stop_loss(price) {
            Some(if self.is_trailing() {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            })
        } else if self.should_take_profit(price) {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub kind: TradeKind,
    pub price: f64,
    pub size: f64,
    /// Exit only: return as a fraction of the entry price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_ratio: Option<f64>,
    /// Exit only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_amount: Option<f64>,
    /// Exit only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExitReason>,
    pub timestamp: NaiveDateTime,
}

impl Trade {
    pub fn entry(symbol: &str, price: f64, size: f64, timestamp: NaiveDateTime) -> Self {
        Trade {
            symbol: symbol.to_string(),
            kind: TradeKind::Entry,
            price,
            size,
            profit_ratio: None,
            profit_amount: None,
            reason: None,
            timestamp,
        }
    }

    pub fn exit(
        symbol: &str,
        price: f64,
        size: f64,
        profit_ratio: f64,
        reason: ExitReason,
        timestamp: NaiveDateTime,
    ) -> Self {
        Trade {
            symbol: symbol.to_string(),
            kind: TradeKind::Exit,
            price,
            size,
            profit_ratio: Some(profit_ratio),
            profit_amount: Some(size * profit_ratio),
            reason: Some(reason),
            timestamp,
        }
    }

    pub fn is_exit(&self) -> bool {
        self.kind == TradeKind::Exit
    }

    pub fn is_win(&self) -> bool {
        self.profit_ratio.is_some_and(|p| p > 0.0)
    }
}
