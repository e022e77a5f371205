//! Signal sources: indicator snapshot in, bounded BUY/SELL/HOLD signal out.

pub mod ensemble;
pub mod weighted;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::indicator::IndicatorSnapshot;

pub use ensemble::EnsembleScorer;
pub use weighted::{Condition, ScoreRule, ScorerConfig, WeightTable, WeightedScorer};

pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.9;
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub action: Action,
    /// Always within [`MIN_CONFIDENCE`, `MAX_CONFIDENCE`].
    pub confidence: f64,
}

impl Signal {
    pub fn new(action: Action, confidence: f64) -> Self {
        Signal {
            action,
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn neutral() -> Self {
        Signal {
            action: Action::Hold,
            confidence: NEUTRAL_CONFIDENCE,
        }
    }
}

/// NaN maps to neutral so the bound holds for any input.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_CONFIDENCE
    } else {
        value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }
}

/// A stateless mapping from an indicator snapshot to a signal.
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, snapshot: &IndicatorSnapshot) -> Signal;

    /// Scores the newest snapshot; HOLD/0.5 while warm-up is incomplete.
    fn score_latest(&self, snapshots: &[Option<IndicatorSnapshot>]) -> Signal {
        match snapshots.last() {
            Some(Some(snapshot)) => self.score(snapshot),
            _ => Signal::neutral(),
        }
    }
}
