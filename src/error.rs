//! Error types for Keystroke Guardian.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    /// Empty or too-short sample.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Typed text did not match the target phrase.
    #[error("typed text does not match the target phrase")]
    TextMismatch,

    #[error("no profile found at {}", path.display())]
    ProfileNotFound { path: PathBuf },

    #[error("corrupt profile: {0}")]
    CorruptProfile(String),

    /// Profile values that cannot produce a meaningful verdict.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("insufficient training data: {found} samples stored, at least {required} required")]
    InsufficientTrainingData { found: usize, required: usize },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("capture failed: {0}")]
    CaptureFailure(String),

    #[error("evidence capture failed: {0}")]
    EvidenceCaptureFailure(String),
}

impl GuardError {
    /// Sample-level errors are recovered by discarding the sample.
    pub fn is_sample_error(&self) -> bool {
        matches!(
            self,
            GuardError::InsufficientData(_) | GuardError::TextMismatch | GuardError::CaptureFailure(_)
        )
    }

    /// Profile-level errors are shown to the user before returning to the menu.
    pub fn is_profile_error(&self) -> bool {
        matches!(
            self,
            GuardError::ProfileNotFound { .. }
                | GuardError::CorruptProfile(_)
                | GuardError::InvalidProfile(_)
                | GuardError::InsufficientTrainingData { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
