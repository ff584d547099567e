//! Key-press event types delivered by the key listener.
//!
//! Events carry timing only. The single piece of key identity kept is
//! whether the press was Return, which ends a typed sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of key went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Any key that contributes to the typed text
    Typing,
    /// Return / Enter, terminating the sample
    Return,
}

/// A single key press with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPress {
    /// Timestamp when the key went down
    pub timestamp: DateTime<Utc>,
    pub kind: KeyKind,
}

impl KeyPress {
    pub fn new(kind: KeyKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, kind: KeyKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn is_return(&self) -> bool {
        self.kind == KeyKind::Return
    }
}
