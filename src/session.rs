//! Train and Authenticate sessions.
//!
//! ```text
//! Menu ─▶ Capturing ─▶ Validating ─▶ Recorded | Discarded ─▶ Menu
//!                                        │
//!                    (authenticate) ─▶ Deciding ─▶ Granted | Rejected(+evidence) ─▶ Menu
//! ```
//!
//! Training keeps prompting until the required number of samples is
//! recorded. A bad sample is either discarded and re-prompted
//! ([`RetryPolicy::Reprompt`], bounded by `max_attempts`) or aborts the whole
//! session ([`RetryPolicy::Abort`]). Either way the store is only written
//! once, after every sample has been accepted.

use crate::capture::{CaptureSource, SamplePrompt, SampleValidator};
use crate::config::{Config, RetryPolicy};
use crate::core::decision::{Decision, DecisionEngine, DecisionStrategy, Verdict};
use crate::core::features::{extract, FlightTimes};
use crate::core::profile::{Profile, StrategyKind};
use crate::error::{GuardError, Result};
use crate::evidence::{EvidenceDispatcher, EvidenceTrigger};
use crate::store::ProfileStore;
use crate::transparency::SharedTransparencyLog;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Menu,
    Capturing,
    Validating,
    Recorded,
    Discarded,
    Deciding,
    Granted,
    Rejected,
}

/// Session parameters derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub strategy: StrategyKind,
    pub required_samples: usize,
    pub retry_policy: RetryPolicy,
    pub max_attempts: usize,
    pub validator: SampleValidator,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        let required_samples = config.required_samples();
        Self {
            strategy: config.strategy,
            required_samples,
            retry_policy: config.retry_policy,
            max_attempts: config.max_attempts.max(required_samples),
            validator: SampleValidator {
                phrase: config.target_phrase.clone(),
                exact_text: config.exact_text,
                min_text_len: config.min_text_len,
            },
        }
    }
}

/// Progress notifications for whoever drives the session.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    SampleRecorded { recorded: usize, required: usize },
    SampleDiscarded { error: &'a GuardError },
    EvidenceDispatched,
}

pub type SessionReporter = Box<dyn FnMut(&SessionEvent<'_>)>;

#[derive(Debug)]
pub enum TrainOutcome {
    Saved { profile: Profile, discarded: usize },
    /// The store was left untouched.
    Aborted { recorded: usize, reason: GuardError },
}

#[derive(Debug)]
pub enum AuthOutcome {
    Granted(Decision),
    Rejected(Decision),
    /// Capture or validation failed; no decision was made.
    NoInput(GuardError),
}

impl AuthOutcome {
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            AuthOutcome::Granted(d) | AuthOutcome::Rejected(d) => Some(d.verdict()),
            AuthOutcome::NoInput(_) => None,
        }
    }
}

/// Orchestrates capture, extraction, storage and decisions.
pub struct SessionController<C, S> {
    settings: SessionSettings,
    capture: C,
    store: S,
    engine: DecisionEngine,
    evidence: EvidenceDispatcher,
    log: SharedTransparencyLog,
    state: SessionState,
    reporter: Option<SessionReporter>,
}

impl<C: CaptureSource, S: ProfileStore> SessionController<C, S> {
    pub fn new(
        settings: SessionSettings,
        engine: DecisionEngine,
        capture: C,
        store: S,
        evidence: EvidenceDispatcher,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            settings,
            capture,
            store,
            engine,
            evidence,
            log,
            state: SessionState::Menu,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: SessionReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn capture_source(&self) -> &C {
        &self.capture
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Wait for background evidence captures to finish.
    pub fn wait_for_evidence(&mut self) {
        self.evidence.wait();
    }

    /// Record enough samples to build a profile, then replace the stored one.
    pub fn train(&mut self) -> Result<TrainOutcome> {
        self.enter(SessionState::Menu);
        let required = self
            .settings
            .required_samples
            .max(self.settings.strategy.min_samples());
        let mut accepted: Vec<FlightTimes> = Vec::with_capacity(required);
        let mut attempts = 0;
        let mut discarded = 0;

        info!(strategy = %self.settings.strategy, required, "training started");

        while accepted.len() < required {
            if attempts >= self.settings.max_attempts {
                let reason = GuardError::InsufficientData(format!(
                    "only {} of {required} samples recorded after {attempts} attempts",
                    accepted.len()
                ));
                return Ok(self.abort_training(accepted.len(), reason));
            }
            attempts += 1;

            let title = format!("--- Sample {}/{required} ---", accepted.len() + 1);
            match self.capture_sample(&title) {
                Ok(times) => {
                    accepted.push(times);
                    self.enter(SessionState::Recorded);
                    self.log.record_sample_recorded();
                    self.report(&SessionEvent::SampleRecorded {
                        recorded: accepted.len(),
                        required,
                    });
                }
                Err(error) => {
                    self.enter(SessionState::Discarded);
                    self.log.record_sample_discarded();
                    discarded += 1;
                    warn!(error = %error, attempt = attempts, "training sample discarded");
                    self.report(&SessionEvent::SampleDiscarded { error: &error });

                    if self.settings.retry_policy == RetryPolicy::Abort {
                        return Ok(self.abort_training(accepted.len(), error));
                    }
                }
            }
        }

        let profile = match self.build_profile(&accepted) {
            Ok(profile) => profile,
            Err(reason) => return Ok(self.abort_training(accepted.len(), reason)),
        };

        let saved = self.store.save(&profile);
        self.enter(SessionState::Menu);
        saved?;

        self.log.record_training_completed();
        info!(profile = %profile.describe(), discarded, "training complete");
        Ok(TrainOutcome::Saved { profile, discarded })
    }

    /// One authentication attempt against the stored profile.
    pub fn authenticate(&mut self) -> Result<AuthOutcome> {
        self.enter(SessionState::Menu);

        let profile = self.store.load()?;
        if profile.kind() != self.engine.kind() {
            return Err(GuardError::InvalidProfile(format!(
                "stored profile was trained for the {} strategy but the {} strategy is configured; retrain first",
                profile.kind(),
                self.engine.kind()
            )));
        }

        let times = match self.capture_sample("Verify your identity:") {
            Ok(times) => times,
            Err(error) => {
                self.enter(SessionState::Menu);
                self.log.record_no_input();
                debug!(error = %error, "authentication aborted before decision");
                return Ok(AuthOutcome::NoInput(error));
            }
        };

        self.enter(SessionState::Deciding);
        let decision = match self.engine.decide(&profile, &times) {
            Ok(decision) => decision,
            Err(error) => {
                self.enter(SessionState::Menu);
                return Err(error);
            }
        };

        let outcome = match decision.verdict() {
            Verdict::Granted => {
                self.enter(SessionState::Granted);
                self.log.record_access_granted();
                info!("access granted");
                AuthOutcome::Granted(decision)
            }
            Verdict::Rejected => {
                self.enter(SessionState::Rejected);
                self.log.record_access_rejected();
                warn!("biometric mismatch, access rejected");
                self.evidence.dispatch(EvidenceTrigger::new("biometric mismatch"));
                self.report(&SessionEvent::EvidenceDispatched);
                AuthOutcome::Rejected(decision)
            }
        };

        self.enter(SessionState::Menu);
        Ok(outcome)
    }

    fn capture_sample(&mut self, title: &str) -> Result<FlightTimes> {
        self.enter(SessionState::Capturing);
        let prompt = SamplePrompt {
            title: title.to_string(),
            phrase: &self.settings.validator.phrase,
        };
        let sample = self.capture.capture(&prompt)?;

        self.enter(SessionState::Validating);
        self.settings.validator.validate(sample)
    }

    fn build_profile(&self, samples: &[FlightTimes]) -> Result<Profile> {
        match self.settings.strategy {
            StrategyKind::Threshold => Profile::threshold_from_samples(samples),
            StrategyKind::Model => {
                let vectors = samples.iter().map(extract).collect::<Result<Vec<_>>>()?;
                Ok(Profile::Model { samples: vectors })
            }
        }
    }

    fn abort_training(&mut self, recorded: usize, reason: GuardError) -> TrainOutcome {
        self.enter(SessionState::Menu);
        self.log.record_training_aborted();
        warn!(recorded, reason = %reason, "training aborted, stored profile unchanged");
        TrainOutcome::Aborted { recorded, reason }
    }

    fn enter(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    fn report(&mut self, event: &SessionEvent<'_>) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter(event);
        }
    }
}
