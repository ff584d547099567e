//! Session transparency log.
//!
//! Counts what the guardian did (samples kept or discarded, verdicts,
//! evidence captures) without storing any typed text or timing data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct TransparencyLog {
    samples_recorded: AtomicU64,
    samples_discarded: AtomicU64,
    trainings_completed: AtomicU64,
    trainings_aborted: AtomicU64,
    access_granted: AtomicU64,
    access_rejected: AtomicU64,
    no_input: AtomicU64,
    evidence_saved: AtomicU64,
    evidence_failed: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            samples_recorded: AtomicU64::new(0),
            samples_discarded: AtomicU64::new(0),
            trainings_completed: AtomicU64::new(0),
            trainings_aborted: AtomicU64::new(0),
            access_granted: AtomicU64::new(0),
            access_rejected: AtomicU64::new(0),
            no_input: AtomicU64::new(0),
            evidence_saved: AtomicU64::new(0),
            evidence_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that loads previous totals from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    pub fn record_sample_recorded(&self) {
        self.samples_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_discarded(&self) {
        self.samples_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_training_completed(&self) {
        self.trainings_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_training_aborted(&self) {
        self.trainings_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_access_granted(&self) {
        self.access_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_access_rejected(&self) {
        self.access_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_input(&self) {
        self.no_input.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evidence_saved(&self) {
        self.evidence_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evidence_failed(&self) {
        self.evidence_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            trainings_completed: self.trainings_completed.load(Ordering::Relaxed),
            trainings_aborted: self.trainings_aborted.load(Ordering::Relaxed),
            access_granted: self.access_granted.load(Ordering::Relaxed),
            access_rejected: self.access_rejected.load(Ordering::Relaxed),
            no_input: self.no_input.load(Ordering::Relaxed),
            evidence_saved: self.evidence_saved.load(Ordering::Relaxed),
            evidence_failed: self.evidence_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Guardian Statistics:\n\
             - Samples recorded: {}\n\
             - Samples discarded: {}\n\
             - Trainings completed: {}\n\
             - Trainings aborted: {}\n\
             - Access granted: {}\n\
             - Access rejected: {}\n\
             - Attempts without input: {}\n\
             - Evidence images saved: {}\n\
             - Evidence captures failed: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Typed text is compared in memory and never stored\n\
             - Only timing summaries are kept in the profile",
            stats.samples_recorded,
            stats.samples_discarded,
            stats.trainings_completed,
            stats.trainings_aborted,
            stats.access_granted,
            stats.access_rejected,
            stats.no_input,
            stats.evidence_saved,
            stats.evidence_failed,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_recorded: stats.samples_recorded,
                samples_discarded: stats.samples_discarded,
                trainings_completed: stats.trainings_completed,
                trainings_aborted: stats.trainings_aborted,
                access_granted: stats.access_granted,
                access_rejected: stats.access_rejected,
                no_input: stats.no_input,
                evidence_saved: stats.evidence_saved,
                evidence_failed: stats.evidence_failed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_recorded
                    .store(persisted.samples_recorded, Ordering::Relaxed);
                self.samples_discarded
                    .store(persisted.samples_discarded, Ordering::Relaxed);
                self.trainings_completed
                    .store(persisted.trainings_completed, Ordering::Relaxed);
                self.trainings_aborted
                    .store(persisted.trainings_aborted, Ordering::Relaxed);
                self.access_granted
                    .store(persisted.access_granted, Ordering::Relaxed);
                self.access_rejected
                    .store(persisted.access_rejected, Ordering::Relaxed);
                self.no_input.store(persisted.no_input, Ordering::Relaxed);
                self.evidence_saved
                    .store(persisted.evidence_saved, Ordering::Relaxed);
                self.evidence_failed
                    .store(persisted.evidence_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub samples_recorded: u64,
    pub samples_discarded: u64,
    pub trainings_completed: u64,
    pub trainings_aborted: u64,
    pub access_granted: u64,
    pub access_rejected: u64,
    pub no_input: u64,
    pub evidence_saved: u64,
    pub evidence_failed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    samples_recorded: u64,
    #[serde(default)]
    samples_discarded: u64,
    #[serde(default)]
    trainings_completed: u64,
    #[serde(default)]
    trainings_aborted: u64,
    #[serde(default)]
    access_granted: u64,
    #[serde(default)]
    access_rejected: u64,
    #[serde(default)]
    no_input: u64,
    #[serde(default)]
    evidence_saved: u64,
    #[serde(default)]
    evidence_failed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
