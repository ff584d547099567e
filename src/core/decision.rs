//! Accept/reject decisions for a candidate sample against a stored profile.

use crate::core::features::{extract, FlightTimes};
use crate::core::forest::{ForestParams, IsolationForest};
use crate::core::profile::{Profile, StrategyKind};
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum stored feature vectors for the forest to partition meaningfully.
pub const MIN_MODEL_SAMPLES: usize = 3;

/// Default relative tolerance of the threshold strategy.
pub const DEFAULT_TOLERANCE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Granted,
    Rejected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Granted => write!(f, "GRANTED"),
            Verdict::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A verdict together with the numbers that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Threshold {
        verdict: Verdict,
        candidate_avg: f64,
        profile_avg: f64,
        diff: f64,
        threshold: f64,
    },
    Model {
        verdict: Verdict,
        score: f64,
        cutoff: f64,
    },
}

impl Decision {
    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Threshold { verdict, .. } | Decision::Model { verdict, .. } => *verdict,
        }
    }
}

/// A decision strategy over one profile representation.
pub trait DecisionStrategy {
    fn kind(&self) -> StrategyKind;

    fn decide(&self, profile: &Profile, candidate: &FlightTimes) -> Result<Decision>;
}

/// Relative tolerance around the enrolled mean flight time.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdStrategy {
    pub tolerance: f64,
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl DecisionStrategy for ThresholdStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Threshold
    }

    fn decide(&self, profile: &Profile, candidate: &FlightTimes) -> Result<Decision> {
        let profile_avg = match profile {
            Profile::Threshold { avg_flight } => *avg_flight,
            other => return Err(strategy_mismatch(self.kind(), other.kind())),
        };

        if !profile_avg.is_finite() || profile_avg <= 0.0 {
            return Err(GuardError::InvalidProfile(format!(
                "average flight time must be positive, found {profile_avg}"
            )));
        }

        let candidate_avg = candidate.mean().ok_or_else(|| {
            GuardError::InvalidProfile("candidate sample has no flight times".to_string())
        })?;

        let diff = (candidate_avg - profile_avg).abs();
        let threshold = profile_avg * self.tolerance;
        let verdict = if diff < threshold {
            Verdict::Granted
        } else {
            Verdict::Rejected
        };

        Ok(Decision::Threshold {
            verdict,
            candidate_avg,
            profile_avg,
            diff,
            threshold,
        })
    }
}

/// Isolation forest refit on the stored feature vectors for every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelStrategy {
    pub params: ForestParams,
}

impl DecisionStrategy for ModelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Model
    }

    fn decide(&self, profile: &Profile, candidate: &FlightTimes) -> Result<Decision> {
        let samples = match profile {
            Profile::Model { samples } => samples,
            other => return Err(strategy_mismatch(self.kind(), other.kind())),
        };

        if samples.len() < MIN_MODEL_SAMPLES {
            return Err(GuardError::InsufficientTrainingData {
                found: samples.len(),
                required: MIN_MODEL_SAMPLES,
            });
        }

        let features = extract(candidate)?;
        let training: Vec<Vec<f64>> = samples.iter().map(|s| s.to_array().to_vec()).collect();
        let forest = IsolationForest::fit(&training, self.params);

        let point = features.to_array();
        let score = forest.score(&point);
        let cutoff = forest.cutoff();
        let verdict = if score <= cutoff {
            Verdict::Granted
        } else {
            Verdict::Rejected
        };

        Ok(Decision::Model {
            verdict,
            score,
            cutoff,
        })
    }
}

/// The configured engine, dispatching to one strategy.
#[derive(Debug, Clone, Copy)]
pub enum DecisionEngine {
    Threshold(ThresholdStrategy),
    Model(ModelStrategy),
}

impl DecisionEngine {
    pub fn new(kind: StrategyKind, tolerance: f64, params: ForestParams) -> Self {
        match kind {
            StrategyKind::Threshold => DecisionEngine::Threshold(ThresholdStrategy { tolerance }),
            StrategyKind::Model => DecisionEngine::Model(ModelStrategy { params }),
        }
    }

    fn strategy(&self) -> &dyn DecisionStrategy {
        match self {
            DecisionEngine::Threshold(s) => s,
            DecisionEngine::Model(s) => s,
        }
    }
}

impl DecisionStrategy for DecisionEngine {
    fn kind(&self) -> StrategyKind {
        self.strategy().kind()
    }

    fn decide(&self, profile: &Profile, candidate: &FlightTimes) -> Result<Decision> {
        self.strategy().decide(profile, candidate)
    }
}

fn strategy_mismatch(configured: StrategyKind, stored: StrategyKind) -> GuardError {
    GuardError::InvalidProfile(format!(
        "stored profile was trained for the {stored} strategy but the {configured} strategy is configured; retrain first"
    ))
}
