//! Decision-tree ensemble signal source.
//!
//! A forest of pre-trained trees serialized as JSON. Each split compares one
//! snapshot feature against a threshold (`<=` goes left); each leaf carries
//! class probabilities. Tree outputs are averaged and the most probable class
//! wins, with ties resolved to HOLD.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::error::PapertraderError;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::signal::{Action, Signal, SignalSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Rsi,
    Momentum { horizon: usize },
    PriceVsSma { name: String },
    SmaRatio { fast: String, slow: String },
    VolumeRatio,
    Volatility,
}

impl Feature {
    pub fn extract(&self, snapshot: &IndicatorSnapshot) -> Option<f64> {
        match self {
            Feature::Rsi => snapshot.rsi,
            Feature::Momentum { horizon } => snapshot.momentum(*horizon),
            Feature::PriceVsSma { name } => snapshot.price_vs_sma(name),
            Feature::SmaRatio { fast, slow } => snapshot.sma_ratio(fast, slow),
            Feature::VolumeRatio => snapshot.volume_ratio,
            Feature::Volatility => snapshot.volatility,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub sell: f64,
    pub buy: f64,
    pub hold: f64,
}

impl ClassProbabilities {
    fn is_valid(&self) -> bool {
        [self.sell, self.buy, self.hold]
            .iter()
            .all(|p| p.is_finite() && *p >= 0.0)
    }

    /// Most probable class; any tie involving the leader resolves to HOLD.
    pub fn decide(&self) -> (Action, f64) {
        if self.buy > self.sell && self.buy > self.hold {
            (Action::Buy, self.buy)
        } else if self.sell > self.buy && self.sell > self.hold {
            (Action::Sell, self.sell)
        } else {
            (Action::Hold, self.hold.max(self.buy).max(self.sell))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: Feature,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf(ClassProbabilities),
}

impl TreeNode {
    pub fn predict(&self, snapshot: &IndicatorSnapshot) -> Option<ClassProbabilities> {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf(probs) => return Some(*probs),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = feature.extract(snapshot)?;
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    fn validate(&self) -> Result<(), PapertraderError> {
        match self {
            TreeNode::Leaf(probs) if probs.is_valid() => Ok(()),
            TreeNode::Leaf(probs) => Err(PapertraderError::Model {
                reason: format!("leaf probabilities must be finite and non-negative: {probs:?}"),
            }),
            TreeNode::Split {
                threshold,
                left,
                right,
                ..
            } => {
                if !threshold.is_finite() {
                    return Err(PapertraderError::Model {
                        reason: "split threshold must be finite".to_string(),
                    });
                }
                left.validate()?;
                right.validate()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub trees: Vec<TreeNode>,
}

#[derive(Debug, Clone)]
pub struct EnsembleScorer {
    model: EnsembleModel,
}

impl EnsembleScorer {
    pub fn new(model: EnsembleModel) -> Result<Self, PapertraderError> {
        if model.trees.is_empty() {
            return Err(PapertraderError::Model {
                reason: "ensemble has no trees".to_string(),
            });
        }
        for tree in &model.trees {
            tree.validate()?;
        }
        Ok(EnsembleScorer { model })
    }

    pub fn from_json(json: &str) -> Result<Self, PapertraderError> {
        let model: EnsembleModel =
            serde_json::from_str(json).map_err(|e| PapertraderError::Model {
                reason: e.to_string(),
            })?;
        Self::new(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, PapertraderError> {
        let json = std::fs::read_to_string(path).map_err(|e| PapertraderError::Model {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    pub fn tree_count(&self) -> usize {
        self.model.trees.len()
    }

    /// Averaged class probabilities; `None` if any tree needs a missing feature.
    pub fn predict(&self, snapshot: &IndicatorSnapshot) -> Option<ClassProbabilities> {
        let mut total = ClassProbabilities::default();
        for tree in &self.model.trees {
            let p = tree.predict(snapshot)?;
            total.sell += p.sell;
            total.buy += p.buy;
            total.hold += p.hold;
        }
        let n = self.model.trees.len() as f64;
        Some(ClassProbabilities {
            sell: total.sell / n,
            buy: total.buy / n,
            hold: total.hold / n,
        })
    }
}

impl SignalSource for EnsembleScorer {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn score(&self, snapshot: &IndicatorSnapshot) -> Signal {
        match self.predict(snapshot) {
            Some(probs) => {
                let (action, confidence) = probs.decide();
                Signal::new(action, confidence)
            }
            None => Signal::neutral(),
        }
    }
}
