//! Non-macOS (noop) key listener.
//!
//! This exists so the crate (and binary) can compile on targets without an
//! event tap. It never emits key presses, so captures made with it report
//! no input.

use crate::collector::types::KeyPress;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors that can occur while listening for keys.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Key listener is already running"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// A listener that never emits events.
pub struct NoopCollector {
    _sender: Sender<KeyPress>,
    receiver: Receiver<KeyPress>,
    running: Arc<AtomicBool>,
}

impl NoopCollector {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1_024);
        Self {
            _sender: sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start listening. On this platform it only marks the listener as running.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<KeyPress> {
        &self.receiver
    }
}

impl Default for NoopCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// There is no Input Monitoring permission gate on this platform.
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice_fails() {
        let mut collector = NoopCollector::new();
        collector.start().unwrap();
        assert!(collector.is_running());
        assert!(matches!(
            collector.start(),
            Err(CollectorError::AlreadyRunning)
        ));
        collector.stop();
        assert!(!collector.is_running());
        assert!(collector.receiver().try_recv().is_err());
    }
}
