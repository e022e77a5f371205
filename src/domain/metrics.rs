//! Performance metrics and cross-symbol comparison.

use serde::Serialize;
use std::collections::BTreeMap;

use super::backtest::BacktestResult;
use super::position::Trade;

/// (final - initial) / initial * 100
pub fn total_return_percent(initial: f64, final_balance: f64) -> f64 {
    if initial > 0.0 {
        (final_balance - initial) / initial * 100.0
    } else {
        0.0
    }
}

/// Share of exit trades with a positive return, in percent; 0 without exits.
pub fn win_rate_percent(trades: &[Trade]) -> f64 {
    let exits: Vec<&Trade> = trades.iter().filter(|t| t.is_exit()).collect();
    if exits.is_empty() {
        return 0.0;
    }
    let wins = exits.iter().filter(|t| t.is_win()).count();
    wins as f64 / exits.len() as f64 * 100.0
}

/// Largest peak-to-trough decline in percent of the running peak. The peak
/// starts at the first point of the curve.
pub fn max_drawdown_percent(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// A [`BacktestResult`] without the trade log and equity curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return_percent: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub max_drawdown_percent: f64,
}

impl From<&BacktestResult> for BacktestSummary {
    fn from(result: &BacktestResult) -> Self {
        BacktestSummary {
            initial_balance: result.initial_balance,
            final_balance: result.final_balance,
            total_return_percent: result.total_return_percent,
            total_trades: result.total_trades,
            win_rate: result.win_rate,
            max_drawdown_percent: result.max_drawdown_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSymbol {
    pub symbol: String,
    pub total_return_percent: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub best: RankedSymbol,
    pub worst: RankedSymbol,
    /// Positive return and win rate above 50%, best return first.
    pub profitable: Vec<RankedSymbol>,
}

/// Ranks per-symbol summaries; `None` for an empty input. Equal returns keep
/// input order.
pub fn compare_results<'a, I>(results: I) -> Option<Comparison>
where
    I: IntoIterator<Item = (&'a str, &'a BacktestSummary)>,
{
    let mut ranked: Vec<RankedSymbol> = results
        .into_iter()
        .map(|(symbol, summary)| RankedSymbol {
            symbol: symbol.to_string(),
            total_return_percent: summary.total_return_percent,
            win_rate: summary.win_rate,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_return_percent.total_cmp(&a.total_return_percent));

    let best = ranked.first()?.clone();
    let worst = ranked.last()?.clone();
    let profitable = ranked
        .into_iter()
        .filter(|r| r.total_return_percent > 0.0 && r.win_rate > 50.0)
        .collect();

    Some(Comparison {
        best,
        worst,
        profitable,
    })
}

/// Per-symbol results of one backtest run, keyed and ordered by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestReport {
    pub results: BTreeMap<String, BacktestResult>,
}

impl BacktestReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, result: BacktestResult) {
        self.results.insert(symbol.to_string(), result);
    }

    pub fn summaries(&self) -> BTreeMap<String, BacktestSummary> {
        self.results
            .iter()
            .map(|(symbol, result)| (symbol.clone(), BacktestSummary::from(result)))
            .collect()
    }

    pub fn comparison(&self) -> Option<Comparison> {
        let summaries = self.summaries();
        compare_results(summaries.iter().map(|(s, summary)| (s.as_str(), summary)))
    }
}
