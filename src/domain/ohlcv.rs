//! OHLCV bar representation and ingestion normalisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// `None` when the feed carries no volume column.
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Counts of rows removed by [`normalize_bars`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub duplicates: usize,
    pub invalid_close: usize,
}

impl IngestReport {
    pub fn dropped(&self) -> usize {
        self.duplicates + self.invalid_close
    }
}

/// Sort ascending by timestamp, keep the first bar seen for each timestamp and
/// drop bars whose close is non-finite or non-positive.
pub fn normalize_bars(bars: Vec<Bar>) -> (Vec<Bar>, IngestReport) {
    let mut report = IngestReport::default();

    let mut valid: Vec<Bar> = bars
        .into_iter()
        .filter(|bar| {
            let ok = bar.close.is_finite() && bar.close > 0.0;
            if !ok {
                report.invalid_close += 1;
            }
            ok
        })
        .collect();

    // stable sort keeps arrival order among equal timestamps
    valid.sort_by_key(|bar| bar.timestamp);

    let before = valid.len();
    valid.dedup_by_key(|bar| bar.timestamp);
    report.duplicates = before - valid.len();

    (valid, report)
}

/// Closing prices of a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
