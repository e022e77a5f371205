//! JSON report adapter implementing ReportPort.
//!
//! The document has a `symbols` object keyed by symbol and a `comparison`
//! block (null for an empty run). Trade logs and equity curves are only
//! included in full mode.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::PapertraderError;
use crate::domain::metrics::{BacktestReport, BacktestSummary, Comparison};
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct ReportDocument<'a, T: Serialize> {
    symbols: BTreeMap<&'a str, T>,
    comparison: Option<Comparison>,
}

#[derive(Debug, Default)]
pub struct JsonReportAdapter {
    full: bool,
}

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include every trade and the equity curve.
    pub fn full() -> Self {
        Self { full: true }
    }

    pub fn render(&self, report: &BacktestReport) -> Result<String, PapertraderError> {
        let comparison = report.comparison();
        let rendered = if self.full {
            let symbols: BTreeMap<&str, &BacktestResult> = report
                .results
                .iter()
                .map(|(symbol, result)| (symbol.as_str(), result))
                .collect();
            serde_json::to_string_pretty(&ReportDocument { symbols, comparison })
        } else {
            let symbols: BTreeMap<&str, BacktestSummary> = report
                .results
                .iter()
                .map(|(symbol, result)| (symbol.as_str(), BacktestSummary::from(result)))
                .collect();
            serde_json::to_string_pretty(&ReportDocument { symbols, comparison })
        };
        rendered.map_err(|e| PapertraderError::Report {
            reason: e.to_string(),
        })
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), PapertraderError> {
        let json = self.render(report)?;
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ExitReason, Trade};
    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use tempfile::tempdir;

    fn sample_result(final_balance: f64) -> BacktestResult {
        let at = DateTime::<Utc>::UNIX_EPOCH.naive_utc();
        let ratio = (final_balance - 50.0) / 50.0;
        BacktestResult {
            initial_balance: 50.0,
            final_balance,
            total_return_percent: ratio * 100.0,
            total_trades: 1,
            win_rate: if ratio > 0.0 { 100.0 } else { 0.0 },
            max_drawdown_percent: 0.0,
            trades: vec![
                Trade::entry("BTCUSDT", 100.0, 50.0, at),
                Trade::exit("BTCUSDT", 100.0 * (1.0 + ratio), 50.0, ratio, ExitReason::SellFinal, at),
            ],
            equity_curve: vec![50.0, final_balance],
        }
    }

    fn sample_report() -> BacktestReport {
        let mut report = BacktestReport::new();
        report.insert("BTCUSDT", sample_result(60.0));
        report.insert("ETHUSDT", sample_result(45.0));
        report
    }

    #[test]
    fn summary_mode_omits_detail() {
        let json = JsonReportAdapter::new().render(&sample_report()).unwrap();
        let doc: Value = serde_json::from_str(&json).unwrap();

        let btc = &doc["symbols"]["BTCUSDT"];
        assert_eq!(btc["total_trades"], 1);
        assert!(btc.get("trades").is_none());
        assert!(btc.get("equity_curve").is_none());
        assert_eq!(doc["comparison"]["best"]["symbol"], "BTCUSDT");
        assert_eq!(doc["comparison"]["worst"]["symbol"], "ETHUSDT");
    }

    #[test]
    fn full_mode_includes_trades() {
        let json = JsonReportAdapter::full().render(&sample_report()).unwrap();
        let doc: Value = serde_json::from_str(&json).unwrap();

        let trades = doc["symbols"]["ETHUSDT"]["trades"].as_array().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1]["reason"], "SELL_FINAL");
        assert_eq!(doc["symbols"]["ETHUSDT"]["equity_curve"][1], 45.0);
    }

    #[test]
    fn empty_report_has_null_comparison() {
        let json = JsonReportAdapter::new().render(&BacktestReport::new()).unwrap();
        let doc: Value = serde_json::from_str(&json).unwrap();
        assert!(doc["comparison"].is_null());
        assert!(doc["symbols"].as_object().unwrap().is_empty());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("nested/deep/report.json");

        JsonReportAdapter::new()
            .write(&sample_report(), &output_path)
            .unwrap();

        let contents = fs::read_to_string(&output_path).unwrap();
        assert!(contents.contains("ETHUSDT"));
    }
}
