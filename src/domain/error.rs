//! Domain error types.

/// Top-level error type for papertrader.
#[derive(Debug, thiserror::Error)]
pub enum PapertraderError {
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient history for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientHistory {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("model error: {reason}")]
    Model { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PapertraderError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        PapertraderError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        PapertraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&PapertraderError> for std::process::ExitCode {
    fn from(err: &PapertraderError) -> Self {
        let code: u8 = match err {
            PapertraderError::Io(_) => 1,
            PapertraderError::ConfigParse { .. }
            | PapertraderError::ConfigMissing { .. }
            | PapertraderError::ConfigInvalid { .. } => 2,
            PapertraderError::Model { .. } => 4,
            PapertraderError::DataUnavailable { .. }
            | PapertraderError::InsufficientHistory { .. } => 5,
            PapertraderError::Report { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_unavailable_message() {
        let err = PapertraderError::data_unavailable("BTCUSDT", "empty response");
        assert_eq!(
            err.to_string(),
            "market data unavailable for BTCUSDT: empty response"
        );
    }

    #[test]
    fn config_invalid_message() {
        let err = PapertraderError::invalid("signal", "buy_threshold", "must exceed 0.5");
        assert_eq!(
            err.to_string(),
            "invalid config value [signal] buy_threshold: must exceed 0.5"
        );
    }

    #[test]
    fn insufficient_history_message() {
        let err = PapertraderError::InsufficientHistory {
            symbol: "ADAUSDT".into(),
            bars: 12,
            minimum: 30,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for ADAUSDT: have 12 bars, need 30"
        );
    }
}
