//! Market data port trait.

use crate::domain::error::PapertraderError;
use crate::domain::ohlcv::Bar;

/// Source of bars and last-traded prices. Implementations fail with
/// [`PapertraderError::DataUnavailable`] on an error or empty response and
/// must not block indefinitely.
pub trait MarketDataPort: Send + Sync {
    /// Up to `limit` most recent bars, ascending by timestamp.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, PapertraderError>;

    fn fetch_last_price(&self, symbol: &str) -> Result<f64, PapertraderError>;
}
