//! Evidence capture on rejected authentication.
//!
//! A rejected verdict dispatches one camera capture to a worker thread. The
//! verdict is already final by then, so the outcome of the capture is only
//! logged and counted.

use crate::error::{GuardError, Result};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Why evidence is being collected.
#[derive(Debug, Clone)]
pub struct EvidenceTrigger {
    pub at: DateTime<Utc>,
    pub reason: String,
}

impl EvidenceTrigger {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            reason: reason.into(),
        }
    }

    /// `INTRUDER_<unix-seconds>.jpg`
    pub fn file_name(&self) -> String {
        format!("INTRUDER_{}.jpg", self.at.timestamp())
    }
}

/// Something that can grab one frame of evidence.
pub trait EvidenceSink: Send + Sync {
    /// Acquire and persist one image, returning where it was saved.
    fn capture(&self, trigger: &EvidenceTrigger) -> Result<PathBuf>;
}

/// Camera capture through an external program (`imagesnap`, `ffmpeg`, ...).
#[derive(Debug, Clone)]
pub struct CommandCamera {
    output_dir: PathBuf,
    command: Vec<String>,
}

impl CommandCamera {
    /// `command` is a program plus arguments; `{output}` marks the image path.
    pub fn new(output_dir: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            command,
        }
    }

    fn build_command(&self, output: &std::path::Path) -> Result<Command> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            GuardError::EvidenceCaptureFailure("no camera command configured".to_string())
        })?;

        let output = output.to_string_lossy();
        let mut command = Command::new(program);
        command
            .args(args.iter().map(|a| a.replace("{output}", &output)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        Ok(command)
    }
}

impl EvidenceSink for CommandCamera {
    fn capture(&self, trigger: &EvidenceTrigger) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            GuardError::EvidenceCaptureFailure(format!("{}: {e}", self.output_dir.display()))
        })?;

        let output_path = self.output_dir.join(trigger.file_name());
        let result = self
            .build_command(&output_path)?
            .output()
            .map_err(|e| GuardError::EvidenceCaptureFailure(format!("could not access the camera: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(GuardError::EvidenceCaptureFailure(format!(
                "camera command exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        if !output_path.exists() {
            return Err(GuardError::EvidenceCaptureFailure(
                "camera produced no image".to_string(),
            ));
        }

        Ok(output_path)
    }
}

/// Runs evidence captures off the session thread.
pub struct EvidenceDispatcher {
    sink: Arc<dyn EvidenceSink>,
    log: Option<SharedTransparencyLog>,
    pending: Vec<JoinHandle<()>>,
}

impl EvidenceDispatcher {
    pub fn new(sink: Arc<dyn EvidenceSink>) -> Self {
        Self {
            sink,
            log: None,
            pending: Vec::new(),
        }
    }

    /// Count capture outcomes in the transparency log.
    pub fn with_log(mut self, log: SharedTransparencyLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Start one capture in the background and return immediately.
    pub fn dispatch(&mut self, trigger: EvidenceTrigger) {
        let sink = self.sink.clone();
        let log = self.log.clone();

        let spawned = thread::Builder::new()
            .name("evidence-capture".to_string())
            .spawn(move || match sink.capture(&trigger) {
                Ok(path) => {
                    info!(path = %path.display(), reason = %trigger.reason, "evidence saved");
                    if let Some(log) = log {
                        log.record_evidence_saved();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "evidence capture failed");
                    if let Some(log) = log {
                        log.record_evidence_failed();
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.pending.retain(|h| !h.is_finished());
                self.pending.push(handle);
            }
            Err(e) => {
                warn!(error = %e, "could not start evidence capture");
                if let Some(log) = &self.log {
                    log.record_evidence_failed();
                }
            }
        }
    }

    /// Block until every dispatched capture has finished.
    pub fn wait(&mut self) {
        for handle in self.pending.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for EvidenceDispatcher {
    fn drop(&mut self) {
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    impl EvidenceSink for CountingSink {
        fn capture(&self, trigger: &EvidenceTrigger) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GuardError::EvidenceCaptureFailure("no camera".to_string()))
            } else {
                Ok(PathBuf::from(trigger.file_name()))
            }
        }
    }

    #[test]
    fn test_trigger_file_name() {
        let trigger = EvidenceTrigger::new("biometric mismatch");
        let name = trigger.file_name();
        assert!(name.starts_with("INTRUDER_"));
        assert!(name.ends_with(".jpg"));
        assert!(name.contains(&trigger.at.timestamp().to_string()));
    }

    #[test]
    fn test_dispatch_records_outcomes() {
        let log = create_shared_log();
        let ok = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let mut dispatcher = EvidenceDispatcher::new(ok.clone()).with_log(log.clone());
        dispatcher.dispatch(EvidenceTrigger::new("test"));
        dispatcher.wait();
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.stats().evidence_saved, 1);

        let failing = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let mut dispatcher = EvidenceDispatcher::new(failing.clone()).with_log(log.clone());
        dispatcher.dispatch(EvidenceTrigger::new("test"));
        dispatcher.wait();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.stats().evidence_failed, 1);
    }

    #[test]
    fn test_empty_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CommandCamera::new(dir.path(), Vec::new());
        let result = camera.capture(&EvidenceTrigger::new("test"));
        assert!(matches!(result, Err(GuardError::EvidenceCaptureFailure(_))));
    }

    #[test]
    fn test_missing_program_fails() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CommandCamera::new(
            dir.path(),
            vec!["keystroke-guardian-no-such-camera".to_string(), "{output}".to_string()],
        );
        let result = camera.capture(&EvidenceTrigger::new("test"));
        assert!(matches!(result, Err(GuardError::EvidenceCaptureFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let camera = CommandCamera::new(
            dir.path(),
            vec!["touch".to_string(), "{output}".to_string()],
        );
        let path = camera.capture(&EvidenceTrigger::new("test")).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
    }
}
