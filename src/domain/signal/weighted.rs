//! Weighted-evidence scorer.
//!
//! The score starts neutral at 0.5. Each rule in the [`WeightTable`] whose
//! conditions all hold adds its weight (bearish rules carry negative
//! weights). The sum is clamped to the confidence bounds and compared with
//! the buy/sell thresholds.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::PapertraderError;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::signal::{Action, NEUTRAL_CONFIDENCE, Signal, SignalSource, clamp_confidence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    StrongUptrend,
    StrongDowntrend,
    Uptrend,
    Downtrend,
    RsiOversold,
    RsiOverbought,
    RsiNeutral,
    MomentumPositive,
    MomentumNegative,
    MomentumStrongPositive,
    MomentumStrongNegative,
    HighVolatility,
    LowVolatility,
    VolumeSpike,
}

impl Condition {
    pub const ALL: [Condition; 14] = [
        Condition::StrongUptrend,
        Condition::StrongDowntrend,
        Condition::Uptrend,
        Condition::Downtrend,
        Condition::RsiOversold,
        Condition::RsiOverbought,
        Condition::RsiNeutral,
        Condition::MomentumPositive,
        Condition::MomentumNegative,
        Condition::MomentumStrongPositive,
        Condition::MomentumStrongNegative,
        Condition::HighVolatility,
        Condition::LowVolatility,
        Condition::VolumeSpike,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::StrongUptrend => "strong_uptrend",
            Condition::StrongDowntrend => "strong_downtrend",
            Condition::Uptrend => "uptrend",
            Condition::Downtrend => "downtrend",
            Condition::RsiOversold => "rsi_oversold",
            Condition::RsiOverbought => "rsi_overbought",
            Condition::RsiNeutral => "rsi_neutral",
            Condition::MomentumPositive => "momentum_positive",
            Condition::MomentumNegative => "momentum_negative",
            Condition::MomentumStrongPositive => "momentum_strong_positive",
            Condition::MomentumStrongNegative => "momentum_strong_negative",
            Condition::HighVolatility => "high_volatility",
            Condition::LowVolatility => "low_volatility",
            Condition::VolumeSpike => "volume_spike",
        }
    }

    pub fn holds(&self, facts: &MarketFacts) -> bool {
        match self {
            Condition::StrongUptrend => facts.short > facts.medium && facts.medium > facts.long,
            Condition::StrongDowntrend => facts.short < facts.medium && facts.medium < facts.long,
            Condition::Uptrend => facts.short > facts.long,
            Condition::Downtrend => facts.short < facts.long,
            Condition::RsiOversold => facts.rsi < facts.rsi_oversold,
            Condition::RsiOverbought => facts.rsi > facts.rsi_overbought,
            Condition::RsiNeutral => {
                facts.rsi >= facts.rsi_oversold && facts.rsi <= facts.rsi_overbought
            }
            Condition::MomentumPositive => facts.momentum > 0.0,
            Condition::MomentumNegative => facts.momentum < 0.0,
            Condition::MomentumStrongPositive => facts.momentum > facts.momentum_threshold,
            Condition::MomentumStrongNegative => facts.momentum < -facts.momentum_threshold,
            Condition::HighVolatility => facts.high_volatility,
            Condition::LowVolatility => !facts.high_volatility,
            Condition::VolumeSpike => facts.volume_ratio > facts.volume_spike,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = PapertraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Condition::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| {
                PapertraderError::invalid("weights", s.trim(), format!("unknown condition '{}'", s.trim()))
            })
    }
}

/// Conjunction of conditions and the increment applied when all hold.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRule {
    pub conditions: Vec<Condition>,
    pub weight: f64,
}

impl ScoreRule {
    pub fn new(conditions: &[Condition], weight: f64) -> Self {
        ScoreRule {
            conditions: conditions.to_vec(),
            weight,
        }
    }

    pub fn matches(&self, facts: &MarketFacts) -> bool {
        self.conditions.iter().all(|c| c.holds(facts))
    }

    pub fn key(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::as_str)
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Ordered rule list. Rules are always summed in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    rules: Vec<ScoreRule>,
}

impl Default for WeightTable {
    fn default() -> Self {
        use Condition::*;
        WeightTable {
            rules: vec![
                ScoreRule::new(&[Uptrend], 0.2),
                ScoreRule::new(&[Downtrend], -0.2),
                ScoreRule::new(&[RsiOversold], 0.15),
                ScoreRule::new(&[RsiOverbought], -0.15),
                ScoreRule::new(&[MomentumPositive], 0.1),
                ScoreRule::new(&[MomentumNegative], -0.1),
                ScoreRule::new(&[LowVolatility], 0.05),
                ScoreRule::new(&[HighVolatility], -0.05),
                ScoreRule::new(&[StrongUptrend, RsiOversold], 0.05),
                ScoreRule::new(&[StrongDowntrend, RsiOverbought], -0.05),
                ScoreRule::new(&[StrongUptrend, MomentumStrongPositive, VolumeSpike], 0.1),
                ScoreRule::new(&[StrongDowntrend, MomentumStrongNegative, VolumeSpike], -0.1),
            ],
        }
    }
}

impl WeightTable {
    pub fn new(rules: Vec<ScoreRule>) -> Self {
        WeightTable { rules }
    }

    /// Builds a table from `conditions -> weight` entries such as
    /// `"strong_uptrend+rsi_oversold" = 0.05`. Entries are sorted by key so
    /// that the summation order does not depend on the source map.
    pub fn from_entries<I>(entries: I) -> Result<Self, PapertraderError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut entries: Vec<(String, f64)> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut rules = Vec::with_capacity(entries.len());
        for (key, weight) in entries {
            if !weight.is_finite() {
                return Err(PapertraderError::invalid("weights", &key, "weight must be finite"));
            }
            let conditions = key
                .split('+')
                .map(Condition::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(ScoreRule { conditions, weight });
        }
        Ok(WeightTable { rules })
    }

    pub fn rules(&self) -> &[ScoreRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Momentum horizon (bars) the momentum conditions read.
    pub momentum_horizon: usize,
    /// Magnitude beyond which momentum counts as strong.
    pub momentum_threshold: f64,
    /// Volume ratio above which volume counts as a spike.
    pub volume_spike: f64,
    pub trend_short: String,
    pub trend_medium: String,
    pub trend_long: String,
    pub weights: WeightTable,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            buy_threshold: 0.7,
            sell_threshold: 0.3,
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            momentum_horizon: 5,
            momentum_threshold: 0.02,
            volume_spike: 1.5,
            trend_short: "short".to_string(),
            trend_medium: "medium".to_string(),
            trend_long: "long".to_string(),
            weights: WeightTable::default(),
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), PapertraderError> {
        if !self.sell_threshold.is_finite()
            || !self.buy_threshold.is_finite()
            || self.sell_threshold >= NEUTRAL_CONFIDENCE
            || self.buy_threshold <= NEUTRAL_CONFIDENCE
        {
            return Err(PapertraderError::invalid(
                "signal",
                "buy_threshold",
                format!(
                    "thresholds must satisfy sell < 0.5 < buy (sell={}, buy={})",
                    self.sell_threshold, self.buy_threshold
                ),
            ));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(PapertraderError::invalid(
                "signal",
                "rsi_oversold",
                "RSI bands must satisfy 0 <= oversold < overbought <= 100",
            ));
        }
        if self.momentum_horizon == 0 {
            return Err(PapertraderError::invalid(
                "signal",
                "momentum_horizon",
                "momentum_horizon must be at least 1",
            ));
        }
        if !self.momentum_threshold.is_finite() || self.momentum_threshold < 0.0 {
            return Err(PapertraderError::invalid(
                "signal",
                "momentum_threshold",
                "momentum_threshold must be non-negative",
            ));
        }
        if !self.volume_spike.is_finite() || self.volume_spike <= 0.0 {
            return Err(PapertraderError::invalid(
                "signal",
                "volume_spike",
                "volume_spike must be positive",
            ));
        }
        for (key, name) in [
            ("trend_short", &self.trend_short),
            ("trend_medium", &self.trend_medium),
            ("trend_long", &self.trend_long),
        ] {
            if name.trim().is_empty() {
                return Err(PapertraderError::invalid("signal", key, "moving average name is empty"));
            }
        }
        if let Some(rule) = self.weights.rules().iter().find(|r| !r.weight.is_finite()) {
            return Err(PapertraderError::invalid("weights", &rule.key(), "weight must be finite"));
        }
        Ok(())
    }
}

/// Snapshot values resolved against a [`ScorerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketFacts {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
    pub rsi: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub momentum: f64,
    pub momentum_threshold: f64,
    pub high_volatility: bool,
    pub volume_ratio: f64,
    pub volume_spike: f64,
}

impl MarketFacts {
    /// `None` when the snapshot lacks any field the conditions read.
    pub fn resolve(snapshot: &IndicatorSnapshot, config: &ScorerConfig) -> Option<Self> {
        Some(MarketFacts {
            short: snapshot.sma(&config.trend_short)?,
            medium: snapshot.sma(&config.trend_medium)?,
            long: snapshot.sma(&config.trend_long)?,
            rsi: snapshot.rsi?,
            rsi_oversold: config.rsi_oversold,
            rsi_overbought: config.rsi_overbought,
            momentum: snapshot.momentum(config.momentum_horizon)?,
            momentum_threshold: config.momentum_threshold,
            high_volatility: snapshot.is_high_volatility()?,
            volume_ratio: snapshot.volume_ratio?,
            volume_spike: config.volume_spike,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WeightedScorer {
    config: ScorerConfig,
}

impl WeightedScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, PapertraderError> {
        config.validate()?;
        Ok(WeightedScorer { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Unclamped evidence sum; `None` when the snapshot is incomplete.
    pub fn raw_score(&self, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let facts = MarketFacts::resolve(snapshot, &self.config)?;
        Some(
            self.config
                .weights
                .rules()
                .iter()
                .filter(|rule| rule.matches(&facts))
                .fold(NEUTRAL_CONFIDENCE, |score, rule| score + rule.weight),
        )
    }
}

impl SignalSource for WeightedScorer {
    fn name(&self) -> &str {
        "weighted"
    }

    fn score(&self, snapshot: &IndicatorSnapshot) -> Signal {
        let Some(raw) = self.raw_score(snapshot) else {
            return Signal::neutral();
        };
        let confidence = clamp_confidence(raw);
        let action = if confidence > self.config.buy_threshold {
            Action::Buy
        } else if confidence < self.config.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };
        Signal { action, confidence }
    }
}
