//! Enrolled behavioral profiles and their persisted record shape.

use crate::core::decision::MIN_MODEL_SAMPLES;
use crate::core::features::{FeatureVector, FlightTimes};
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which decision strategy a profile (and the engine) is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Scalar mean flight time with a relative tolerance
    Threshold,
    /// Isolation forest fitted on per-sample feature vectors
    Model,
}

impl StrategyKind {
    /// Number of accepted samples a training session must collect.
    pub fn default_required_samples(&self) -> usize {
        match self {
            StrategyKind::Threshold => 5,
            StrategyKind::Model => 3,
        }
    }

    /// Fewest samples a usable profile of this kind can hold.
    pub fn min_samples(&self) -> usize {
        match self {
            StrategyKind::Threshold => 1,
            StrategyKind::Model => MIN_MODEL_SAMPLES,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Threshold => write!(f, "threshold"),
            StrategyKind::Model => write!(f, "model"),
        }
    }
}

/// The enrolled user's profile.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Threshold { avg_flight: f64 },
    Model { samples: Vec<FeatureVector> },
}

impl Profile {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Profile::Threshold { .. } => StrategyKind::Threshold,
            Profile::Model { .. } => StrategyKind::Model,
        }
    }

    /// Build a threshold profile from the pooled intervals of all samples.
    pub fn threshold_from_samples(samples: &[FlightTimes]) -> Result<Self> {
        let mut pooled = FlightTimes::default();
        for sample in samples {
            pooled.extend_from(sample);
        }

        let avg_flight = pooled.mean().ok_or_else(|| {
            GuardError::InsufficientData("no flight times recorded during training".to_string())
        })?;

        Ok(Profile::Threshold { avg_flight })
    }

    /// Short human-readable description for status output.
    pub fn describe(&self) -> String {
        match self {
            Profile::Threshold { avg_flight } => {
                format!("threshold profile (speed score {avg_flight:.4})")
            }
            Profile::Model { samples } => {
                format!("model profile ({} feature vectors)", samples.len())
            }
        }
    }
}

/// On-disk record: `{"avg_flight": f}` or `{"flight_matrices": [[m, v, t], ...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_flight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_matrices: Option<Vec<Vec<f64>>>,
}

impl From<&Profile> for ProfileRecord {
    fn from(profile: &Profile) -> Self {
        match profile {
            Profile::Threshold { avg_flight } => ProfileRecord {
                avg_flight: Some(*avg_flight),
                flight_matrices: None,
            },
            Profile::Model { samples } => ProfileRecord {
                avg_flight: None,
                flight_matrices: Some(samples.iter().map(|s| s.to_array().to_vec()).collect()),
            },
        }
    }
}

impl TryFrom<ProfileRecord> for Profile {
    type Error = GuardError;

    fn try_from(record: ProfileRecord) -> Result<Self> {
        match (record.avg_flight, record.flight_matrices) {
            (Some(avg_flight), None) => {
                if !avg_flight.is_finite() {
                    return Err(GuardError::CorruptProfile(
                        "avg_flight is not a finite number".to_string(),
                    ));
                }
                Ok(Profile::Threshold { avg_flight })
            }
            (None, Some(rows)) => {
                let samples = rows
                    .iter()
                    .enumerate()
                    .map(|(i, row)| {
                        FeatureVector::from_row(row)
                            .filter(FeatureVector::is_finite)
                            .ok_or_else(|| {
                                GuardError::CorruptProfile(format!(
                                    "flight_matrices row {i} must hold 3 finite numbers, found {row:?}"
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if samples.len() < MIN_MODEL_SAMPLES {
                    return Err(GuardError::CorruptProfile(format!(
                        "flight_matrices holds {} rows, at least {MIN_MODEL_SAMPLES} required",
                        samples.len()
                    )));
                }
                Ok(Profile::Model { samples })
            }
            (Some(_), Some(_)) => Err(GuardError::CorruptProfile(
                "record holds both avg_flight and flight_matrices".to_string(),
            )),
            (None, None) => Err(GuardError::CorruptProfile(
                "record is missing avg_flight or flight_matrices".to_string(),
            )),
        }
    }
}
