//! CSV file market-data adapter.
//!
//! One file per symbol, `<base_path>/<SYMBOL>.csv`, with the header
//! `timestamp,open,high,low,close,volume`. An empty volume cell means the
//! feed carries no volume for that bar.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::error::PapertraderError;
use crate::domain::ohlcv::{Bar, normalize_bars};
use crate::ports::data_port::MarketDataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` (UTC) and epoch
/// milliseconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc());
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis);
    }
    None
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.csv", symbol.to_ascii_uppercase()))
    }

    /// Every bar in the symbol's file, normalised.
    pub fn load_bars(&self, symbol: &str) -> Result<Vec<Bar>, PapertraderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            PapertraderError::data_unavailable(
                symbol,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| {
                PapertraderError::data_unavailable(symbol, format!("CSV parse error: {}", e))
            })?;

            let field = |idx: usize, name: &str| -> Result<f64, PapertraderError> {
                record
                    .get(idx)
                    .ok_or_else(|| {
                        PapertraderError::data_unavailable(
                            symbol,
                            format!("row {}: missing {} column", line + 1, name),
                        )
                    })?
                    .trim()
                    .parse()
                    .map_err(|e| {
                        PapertraderError::data_unavailable(
                            symbol,
                            format!("row {}: invalid {} value: {}", line + 1, name, e),
                        )
                    })
            };

            let ts_str = record.get(0).unwrap_or_default();
            let timestamp = parse_timestamp(ts_str).ok_or_else(|| {
                PapertraderError::data_unavailable(
                    symbol,
                    format!("row {}: invalid timestamp '{}'", line + 1, ts_str),
                )
            })?;

            let volume = match record.get(5).map(str::trim) {
                None | Some("") => None,
                Some(_) => Some(field(5, "volume")?),
            };

            bars.push(Bar {
                timestamp,
                open: field(1, "open")?,
                high: field(2, "high")?,
                low: field(3, "low")?,
                close: field(4, "close")?,
                volume,
            });
        }

        let (bars, report) = normalize_bars(bars);
        if report.dropped() > 0 {
            warn!(
                symbol,
                duplicates = report.duplicates,
                invalid_close = report.invalid_close,
                "dropped rows while loading bars"
            );
        }
        debug!(symbol, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }

    /// Writes bars to the symbol's file, replacing it.
    pub fn save_bars(&self, symbol: &str, bars: &[Bar]) -> Result<PathBuf, PapertraderError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.csv_path(symbol);
        write_bars(&path, bars)?;
        Ok(path)
    }

    /// Symbols with a CSV file in the base directory, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, PapertraderError> {
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

fn write_bars(path: &Path, bars: &[Bar]) -> Result<(), PapertraderError> {
    let to_io = |e: csv::Error| PapertraderError::Io(std::io::Error::other(e));
    let mut wtr = csv::Writer::from_path(path).map_err(to_io)?;
    wtr.write_record(["timestamp", "open", "high", "low", "close", "volume"])
        .map_err(to_io)?;
    for bar in bars {
        wtr.write_record([
            bar.timestamp.to_rfc3339(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.map(|v| v.to_string()).unwrap_or_default(),
        ])
        .map_err(to_io)?;
    }
    wtr.flush()?;
    Ok(())
}

impl MarketDataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, PapertraderError> {
        let mut bars = self.load_bars(symbol)?;
        if bars.is_empty() {
            return Err(PapertraderError::data_unavailable(symbol, "no bars in file"));
        }
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }

    fn fetch_last_price(&self, symbol: &str) -> Result<f64, PapertraderError> {
        self.load_bars(symbol)?
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| PapertraderError::data_unavailable(symbol, "no bars in file"))
    }
}
