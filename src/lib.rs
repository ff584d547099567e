//! Keystroke Guardian - typing-rhythm authentication.
//!
//! This library enrolls a user by recording how they type a fixed phrase and
//! later decides whether a new sample was typed by the same person.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Keystroke Guardian                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Collector  │──▶│   Capture   │──▶│  Features   │             │
//! │  │ (key taps)  │   │ (flights)   │   │ (m, v, sum) │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                                         │        │               │
//! │                                  train  ▼        ▼ authenticate  │
//! │                            ┌─────────────┐   ┌─────────────┐     │
//! │                            │   Profile   │──▶│  Decision   │     │
//! │                            │    Store    │   │   Engine    │     │
//! │                            └─────────────┘   └─────────────┘     │
//! │                                                     │ rejected   │
//! │                                                     ▼            │
//! │                                              ┌─────────────┐     │
//! │                                              │  Evidence   │     │
//! │                                              │  (camera)   │     │
//! │                                              └─────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use keystroke_guardian::core::{Profile, ThresholdStrategy, DecisionStrategy, FlightTimes, Verdict};
//!
//! let profile = Profile::Threshold { avg_flight: 0.20 };
//! let candidate = FlightTimes::from(vec![0.19, 0.22, 0.21]);
//! let decision = ThresholdStrategy::default().decide(&profile, &candidate).unwrap();
//! assert_eq!(decision.verdict(), Verdict::Granted);
//! ```

pub mod capture;
pub mod collector;
pub mod config;
pub mod core;
pub mod error;
pub mod evidence;
pub mod session;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use capture::{CaptureSource, CapturedSample, FlightRecorder, KeyboardCapture, SampleValidator};
pub use config::{Config, RetryPolicy};
pub use core::{
    extract, Decision, DecisionEngine, FeatureVector, FlightTimes, Profile, StrategyKind, Verdict,
};
pub use error::{GuardError, Result};
pub use evidence::{CommandCamera, EvidenceDispatcher, EvidenceSink, EvidenceTrigger};
pub use session::{AuthOutcome, SessionController, SessionSettings, TrainOutcome};
pub use store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          KEYSTROKE GUARDIAN - PRIVACY DECLARATION                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This tool recognises you by the rhythm of your typing.          ║
║                                                                  ║
║  ✓ WHAT WE STORE:                                                ║
║    • Your average time between keys (threshold mode), or         ║
║    • Mean, variance and total typing time per sample (model)     ║
║                                                                  ║
║  ✗ WHAT WE NEVER STORE:                                          ║
║    • The text you type (it is only compared in memory)           ║
║    • Which keys you press                                        ║
║    • Raw per-key timestamps                                      ║
║                                                                  ║
║  📸 CAMERA:                                                      ║
║    A single webcam photo is taken only when an authentication    ║
║    attempt is rejected, and saved as INTRUDER_<time>.jpg.        ║
║                                                                  ║
║  You can view statistics anytime with:                           ║
║    keystroke-guardian status                                     ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
