//! Binance public REST market-data adapter.
//!
//! Unauthenticated `/api/v3/klines` and `/api/v3/ticker/price` only; no
//! order endpoints are touched.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::error::PapertraderError;
use crate::domain::ohlcv::{Bar, normalize_bars};
use crate::ports::data_port::MarketDataPort;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance caps a klines page at 1000 candles.
const MAX_PAGE: usize = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

pub struct BinanceAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
    page_pause: Duration,
}

impl BinanceAdapter {
    pub fn new(timeout: Duration) -> Result<Self, PapertraderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, PapertraderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("papertrader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PapertraderError::Io(std::io::Error::other(e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_pause: Duration::from_millis(100),
        })
    }

    fn get_json(
        &self,
        symbol: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, PapertraderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PapertraderError::data_unavailable(symbol, format!("{path}: {e}")))?;
        response
            .json()
            .map_err(|e| PapertraderError::data_unavailable(symbol, format!("{path}: {e}")))
    }

    fn klines_page(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, PapertraderError> {
        let mut query = vec![
            ("symbol", symbol.to_ascii_uppercase()),
            ("interval", interval.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE).to_string()),
        ];
        if let Some(start) = start {
            query.push(("startTime", start.timestamp_millis().to_string()));
        }
        if let Some(end) = end {
            query.push(("endTime", end.timestamp_millis().to_string()));
        }
        let body = self.get_json(symbol, "/api/v3/klines", &query)?;
        parse_klines(symbol, &body)
    }

    /// Every bar between `start` and `end`, paging forward through
    /// `startTime` with a short pause between requests.
    pub fn download_history(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, PapertraderError> {
        let mut all = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let page = match self.klines_page(symbol, interval, MAX_PAGE, Some(cursor), Some(end)) {
                Ok(page) => page,
                // an empty page past the first one just means we are done
                Err(PapertraderError::DataUnavailable { .. }) if !all.is_empty() => break,
                Err(e) => return Err(e),
            };
            let Some(last) = page.last() else { break };
            let next = last.timestamp + chrono::Duration::milliseconds(1);
            debug!(symbol, bars = page.len(), until = %last.timestamp, "downloaded page");
            let full_page = page.len() == MAX_PAGE;
            all.extend(page);
            if !full_page || next <= cursor {
                break;
            }
            cursor = next;
            std::thread::sleep(self.page_pause);
        }

        let (bars, report) = normalize_bars(all);
        if bars.is_empty() {
            return Err(PapertraderError::data_unavailable(symbol, "no history returned"));
        }
        info!(symbol, bars = bars.len(), dropped = report.dropped(), "history downloaded");
        Ok(bars)
    }
}

impl MarketDataPort for BinanceAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, PapertraderError> {
        let (bars, report) = normalize_bars(self.klines_page(symbol, interval, limit, None, None)?);
        if report.dropped() > 0 {
            debug!(symbol, dropped = report.dropped(), "dropped kline rows");
        }
        if bars.is_empty() {
            return Err(PapertraderError::data_unavailable(symbol, "no valid klines"));
        }
        Ok(bars)
    }

    fn fetch_last_price(&self, symbol: &str) -> Result<f64, PapertraderError> {
        let body = self.get_json(
            symbol,
            "/api/v3/ticker/price",
            &[("symbol", symbol.to_ascii_uppercase())],
        )?;
        parse_ticker(symbol, body)
    }
}

fn number(symbol: &str, value: Option<&Value>, name: &str) -> Result<f64, PapertraderError> {
    let parsed = match value {
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PapertraderError::data_unavailable(symbol, format!("kline has no numeric {name}"))
    })
}

/// Kline rows are `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
pub fn parse_klines(symbol: &str, body: &Value) -> Result<Vec<Bar>, PapertraderError> {
    let rows = body.as_array().ok_or_else(|| {
        PapertraderError::data_unavailable(symbol, "klines response is not an array")
    })?;
    if rows.is_empty() {
        return Err(PapertraderError::data_unavailable(symbol, "empty klines response"));
    }

    rows.iter()
        .map(|row| {
            let row = row.as_array().ok_or_else(|| {
                PapertraderError::data_unavailable(symbol, "kline row is not an array")
            })?;
            let timestamp = row
                .first()
                .and_then(Value::as_i64)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .ok_or_else(|| PapertraderError::data_unavailable(symbol, "kline has no open time"))?;
            Ok(Bar {
                timestamp,
                open: number(symbol, row.get(1), "open")?,
                high: number(symbol, row.get(2), "high")?,
                low: number(symbol, row.get(3), "low")?,
                close: number(symbol, row.get(4), "close")?,
                volume: Some(number(symbol, row.get(5), "volume")?),
            })
        })
        .collect()
}

pub fn parse_ticker(symbol: &str, body: Value) -> Result<f64, PapertraderError> {
    let ticker: TickerPrice = serde_json::from_value(body)
        .map_err(|e| PapertraderError::data_unavailable(symbol, format!("ticker: {e}")))?;
    match ticker.price.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        _ => Err(PapertraderError::data_unavailable(
            symbol,
            format!("ticker price '{}' is not a positive number", ticker.price),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn klines_parse_string_numbers() {
        let body = json!([
            [1704067200000_i64, "42283.58", "44184.10", "42180.77", "44179.55", "27174.29",
             1704153599999_i64, "1169995682.4", 1225115, "14457.1", "622000000.1", "0"],
            [1704153600000_i64, "44179.55", "45879.63", "44148.34", "44946.91", "65146.40",
             1704239999999_i64, "2928265412.8", 2072342, "33053.7", "1485000000.2", "0"]
        ]);
        let bars = parse_klines("BTCUSDT", &body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert!((bars[0].close - 44179.55).abs() < f64::EPSILON);
        assert_eq!(bars[1].volume, Some(65146.40));
    }

    #[test]
    fn empty_klines_unavailable() {
        let err = parse_klines("BTCUSDT", &json!([])).unwrap_err();
        assert!(matches!(err, PapertraderError::DataUnavailable { .. }));
    }

    #[test]
    fn malformed_kline_rejected() {
        let body = json!([[1704067200000_i64, "abc", "1", "1", "1", "1"]]);
        let err = parse_klines("BTCUSDT", &body).unwrap_err();
        assert!(err.to_string().contains("open"));
        assert!(parse_klines("BTCUSDT", &json!({"code": -1121})).is_err());
    }

    #[test]
    fn ticker_price_parsed() {
        let price = parse_ticker("ETHUSDT", json!({"symbol": "ETHUSDT", "price": "2301.45"})).unwrap();
        assert!((price - 2301.45).abs() < f64::EPSILON);
    }

    #[test]
    fn bad_ticker_unavailable() {
        assert!(parse_ticker("ETHUSDT", json!({"price": "0"})).is_err());
        assert!(parse_ticker("ETHUSDT", json!({"msg": "Invalid symbol."})).is_err());
    }

    #[test]
    fn unreachable_host_is_unavailable() {
        let adapter =
            BinanceAdapter::with_base_url("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(matches!(
            adapter.fetch_last_price("BTCUSDT"),
            Err(PapertraderError::DataUnavailable { .. })
        ));
    }
}
