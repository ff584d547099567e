//! Transparency module for Keystroke Guardian.
//!
//! Tracks what the guardian has done across sessions so the user can audit
//! it with `keystroke-guardian status`.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
