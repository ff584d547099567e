//! Key listener for Keystroke Guardian.
//!
//! A platform listener observes key presses on a background thread and
//! delivers them, timestamped, over a bounded channel.

pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

pub use types::{KeyKind, KeyPress};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, CollectorError, MacOSCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, CollectorError, NoopCollector};

/// Platform-agnostic collector type alias
#[cfg(not(target_os = "macos"))]
pub type Collector = NoopCollector;
