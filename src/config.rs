//! Configuration for Keystroke Guardian.

use crate::core::decision::DEFAULT_TOLERANCE;
use crate::core::forest::ForestParams;
use crate::core::profile::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Phrase typed in every training and authentication sample.
pub const DEFAULT_TARGET_PHRASE: &str = "The quick brown fox jumps over the lazy dog";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Phrase the user must type
    pub target_phrase: String,

    /// Which decision strategy (and profile shape) to use
    pub strategy: StrategyKind,

    /// Override for the number of samples a training session records
    pub required_samples: Option<usize>,

    /// What training does with a bad sample
    pub retry_policy: RetryPolicy,

    /// Upper bound on capture attempts in one training session
    pub max_attempts: usize,

    /// Samples with fewer typed characters are discarded
    pub min_text_len: usize,

    /// Require the typed text to equal the target phrase
    pub exact_text: bool,

    /// Pause before capture so the menu's Enter key is not recorded
    #[serde(with = "millis_serde")]
    pub settle_delay: Duration,

    /// Relative tolerance of the threshold strategy
    pub tolerance: f64,

    /// Isolation forest settings for the model strategy
    pub forest: ForestConfig,

    /// Where the profile record lives
    pub profile_path: PathBuf,

    /// Path for storing statistics
    pub data_path: PathBuf,

    /// Camera evidence settings
    pub evidence: EvidenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keystroke-guardian");

        Self {
            target_phrase: DEFAULT_TARGET_PHRASE.to_string(),
            strategy: StrategyKind::Threshold,
            required_samples: None,
            retry_policy: RetryPolicy::Reprompt,
            max_attempts: 15,
            min_text_len: 10,
            exact_text: true,
            settle_delay: Duration::from_millis(500),
            tolerance: DEFAULT_TOLERANCE,
            forest: ForestConfig::default(),
            profile_path: data_dir.join("user_profile.json"),
            evidence: EvidenceConfig {
                output_dir: data_dir.join("evidence"),
                command: default_camera_command(),
            },
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keystroke-guardian")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.evidence.output_dir)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.profile_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Samples a training session must record for the configured strategy.
    pub fn required_samples(&self) -> usize {
        self.required_samples
            .unwrap_or_else(|| self.strategy.default_required_samples())
            .max(self.strategy.min_samples())
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }
}

/// How training reacts to a discarded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Discard the sample and prompt again
    Reprompt,
    /// Abort the whole training session
    Abort,
}

/// Isolation forest settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub trees: usize,
    pub contamination: f64,
    pub seed: u64,
    /// Relative widening of training ranges before a point counts as out of range
    pub slack: f64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let params = ForestParams::default();
        Self {
            trees: params.trees,
            contamination: params.contamination,
            seed: params.seed,
            slack: params.slack,
        }
    }
}

impl From<ForestConfig> for ForestParams {
    fn from(config: ForestConfig) -> Self {
        ForestParams {
            trees: config.trees,
            contamination: config.contamination,
            seed: config.seed,
            slack: config.slack,
        }
    }
}

/// Camera evidence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Directory receiving `INTRUDER_<timestamp>.jpg` files
    pub output_dir: PathBuf,
    /// Program and arguments; `{output}` is replaced by the image path
    pub command: Vec<String>,
}

#[cfg(target_os = "macos")]
fn default_camera_command() -> Vec<String> {
    ["imagesnap", "-w", "0.5", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(not(target_os = "macos"))]
fn default_camera_command() -> Vec<String> {
    [
        "ffmpeg",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "v4l2",
        "-i",
        "/dev/video0",
        "-frames:v",
        "1",
        "{output}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Serde support for Duration as whole milliseconds.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
