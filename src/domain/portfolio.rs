//! Static per-symbol sizing weights.

use std::collections::HashMap;

use crate::domain::error::PapertraderError;

pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Symbol -> sizing multiplier. Weights need not sum to one; an unlisted
/// symbol trades at [`DEFAULT_WEIGHT`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioAllocation {
    weights: HashMap<String, f64>,
}

impl PortfolioAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, PapertraderError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut allocation = Self::new();
        for (symbol, weight) in pairs {
            allocation.set(symbol.as_ref(), weight)?;
        }
        Ok(allocation)
    }

    /// Symbols are stored upper-cased.
    pub fn set(&mut self, symbol: &str, weight: f64) -> Result<(), PapertraderError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(PapertraderError::invalid(
                "portfolio",
                symbol,
                "weight must be a non-negative number",
            ));
        }
        self.weights.insert(symbol.to_ascii_uppercase(), weight);
        Ok(())
    }

    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Listed symbols in sorted order.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.weights.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
