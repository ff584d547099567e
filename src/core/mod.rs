//! Core profiling and decision logic.
//!
//! This module contains:
//! - Feature extraction from flight-time sequences
//! - Profile representations and their persisted record shape
//! - The isolation forest used by the model strategy
//! - The decision engine and its two strategies

pub mod decision;
pub mod features;
pub mod forest;
pub mod profile;

// Re-export commonly used types
pub use decision::{
    Decision, DecisionEngine, DecisionStrategy, ModelStrategy, ThresholdStrategy, Verdict,
    DEFAULT_TOLERANCE, MIN_MODEL_SAMPLES,
};
pub use features::{extract, FeatureVector, FlightTimes, FEATURE_DIMENSIONS};
pub use forest::{ForestParams, IsolationForest};
pub use profile::{Profile, ProfileRecord, StrategyKind};
