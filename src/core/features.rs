//! Feature extraction from flight-time sequences.
//!
//! Raw per-keystroke timing is noisy and its length varies with the typist,
//! so every sample is reduced to a fixed-size summary of its rhythm.

use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Number of components in a [`FeatureVector`].
pub const FEATURE_DIMENSIONS: usize = 3;

/// Ordered inter-key intervals (seconds) observed while typing a phrase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightTimes(Vec<f64>);

impl FlightTimes {
    pub fn new(intervals: Vec<f64>) -> Self {
        Self(intervals)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append another sample's intervals, keeping order.
    pub fn extend_from(&mut self, other: &FlightTimes) {
        self.0.extend_from_slice(&other.0);
    }

    /// Arithmetic mean of the intervals, or `None` for an empty sequence.
    pub fn mean(&self) -> Option<f64> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.iter().mean())
        }
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for FlightTimes {
    fn from(intervals: Vec<f64>) -> Self {
        Self(intervals)
    }
}

/// Fixed-size rhythm summary of one typed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mean flight time (typing speed)
    pub mean: f64,
    /// Population variance of flight times (rhythm consistency)
    pub variance: f64,
    /// Sum of flight times (total elapsed time)
    pub total: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_DIMENSIONS] {
        [self.mean, self.variance, self.total]
    }

    /// Build a vector from a persisted row, rejecting wrong dimensionality.
    pub fn from_row(row: &[f64]) -> Option<Self> {
        match row {
            [mean, variance, total] => Some(Self {
                mean: *mean,
                variance: *variance,
                total: *total,
            }),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Reduce a flight-time sequence to its feature vector.
pub fn extract(flight_times: &FlightTimes) -> Result<FeatureVector> {
    if flight_times.is_empty() {
        return Err(GuardError::InsufficientData(
            "flight-time sequence is empty".to_string(),
        ));
    }

    let values = flight_times.as_slice();
    let total: f64 = values.iter().sum();
    let mean = total / values.len() as f64;
    let variance = values.iter().population_variance();

    Ok(FeatureVector {
        mean,
        variance,
        total,
    })
}
