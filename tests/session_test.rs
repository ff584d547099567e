//! End-to-end Train and Authenticate sessions over scripted input.

use keystroke_guardian::capture::{CapturedSample, SampleValidator, ScriptedCapture};
use keystroke_guardian::config::RetryPolicy;
use keystroke_guardian::core::{
    Decision, DecisionEngine, ForestParams, Profile, StrategyKind, Verdict, DEFAULT_TOLERANCE,
};
use keystroke_guardian::evidence::{EvidenceDispatcher, EvidenceSink, EvidenceTrigger};
use keystroke_guardian::session::{
    AuthOutcome, SessionController, SessionSettings, SessionState, TrainOutcome,
};
use keystroke_guardian::store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
use keystroke_guardian::transparency::{create_shared_log, SharedTransparencyLog};
use keystroke_guardian::{GuardError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PHRASE: &str = "The quick brown fox jumps over the lazy dog";
const RHYTHM: [f64; 6] = [0.18, 0.22, 0.20, 0.24, 0.16, 0.21];

#[derive(Default)]
struct CountingSink {
    calls: AtomicUsize,
}

impl CountingSink {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EvidenceSink for CountingSink {
    fn capture(&self, trigger: &EvidenceTrigger) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(trigger.file_name()))
    }
}

/// A camera that is never available.
#[derive(Default)]
struct FailingSink {
    calls: AtomicUsize,
}

impl EvidenceSink for FailingSink {
    fn capture(&self, _trigger: &EvidenceTrigger) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GuardError::EvidenceCaptureFailure(
            "could not access the camera".to_string(),
        ))
    }
}

fn settings(strategy: StrategyKind, retry_policy: RetryPolicy) -> SessionSettings {
    SessionSettings {
        strategy,
        required_samples: strategy.default_required_samples(),
        retry_policy,
        max_attempts: 15,
        validator: SampleValidator {
            phrase: PHRASE.to_string(),
            exact_text: true,
            min_text_len: 10,
        },
    }
}

fn controller<S: ProfileStore>(
    settings: SessionSettings,
    capture: ScriptedCapture,
    store: S,
    sink: Arc<dyn EvidenceSink>,
    log: SharedTransparencyLog,
) -> SessionController<ScriptedCapture, S> {
    let engine = DecisionEngine::new(settings.strategy, DEFAULT_TOLERANCE, ForestParams::default());
    let evidence = EvidenceDispatcher::new(sink).with_log(log.clone());
    SessionController::new(settings, engine, capture, store, evidence, log)
}

fn typed(times: Vec<f64>) -> CapturedSample {
    CapturedSample::new(PHRASE, times)
}

fn rhythm(scale: f64) -> CapturedSample {
    typed(RHYTHM.iter().map(|t| t * scale).collect())
}

#[test]
fn test_threshold_training_saves_pooled_average() {
    let store = MemoryProfileStore::new();
    let log = create_shared_log();
    let mut capture = ScriptedCapture::default();
    for _ in 0..4 {
        capture.push(typed(vec![0.2; 4]));
    }
    capture.push(typed(vec![0.3; 10]));

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        capture,
        &store,
        Arc::new(CountingSink::default()),
        log.clone(),
    );

    match session.train().unwrap() {
        TrainOutcome::Saved { discarded, .. } => assert_eq!(discarded, 0),
        other => panic!("expected saved profile, got {other:?}"),
    }

    // 16 intervals of 0.2 and 10 of 0.3, averaged together.
    let expected = (16.0 * 0.2 + 10.0 * 0.3) / 26.0;
    match store.snapshot() {
        Some(Profile::Threshold { avg_flight }) => assert!((avg_flight - expected).abs() < 1e-9),
        other => panic!("unexpected stored profile {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Menu);
    assert_eq!(log.stats().samples_recorded, 5);
    assert_eq!(log.stats().trainings_completed, 1);
}

#[test]
fn test_reprompt_skips_mismatched_sample() {
    let store = MemoryProfileStore::new();
    let log = create_shared_log();
    let mut capture = ScriptedCapture::default();
    capture.push(rhythm(1.0));
    capture.push(CapturedSample::new("The quick brown cat", RHYTHM.to_vec()));
    capture.push(rhythm(1.0));
    capture.push(rhythm(1.0));

    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        capture,
        &store,
        Arc::new(CountingSink::default()),
        log.clone(),
    );

    match session.train().unwrap() {
        TrainOutcome::Saved { profile, discarded } => {
            assert_eq!(discarded, 1);
            match profile {
                Profile::Model { samples } => assert_eq!(samples.len(), 3),
                other => panic!("expected model profile, got {other:?}"),
            }
        }
        other => panic!("expected saved profile, got {other:?}"),
    }
    assert_eq!(session.capture_source().captures(), 4);
    assert_eq!(log.stats().samples_discarded, 1);
}

#[test]
fn test_abort_policy_keeps_previous_profile() {
    let previous = Profile::Threshold { avg_flight: 0.2 };
    let store = MemoryProfileStore::with_profile(previous.clone());
    let log = create_shared_log();
    let mut capture = ScriptedCapture::default();
    capture.push(rhythm(1.0));
    capture.push(CapturedSample::new("wrong phrase entirely", RHYTHM.to_vec()));
    capture.push(rhythm(1.0));

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Abort),
        capture,
        &store,
        Arc::new(CountingSink::default()),
        log.clone(),
    );

    match session.train().unwrap() {
        TrainOutcome::Aborted { recorded, reason } => {
            assert_eq!(recorded, 1);
            assert!(matches!(reason, GuardError::TextMismatch));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(store.snapshot(), Some(previous));
    assert_eq!(session.capture_source().remaining(), 1);
    assert_eq!(log.stats().trainings_aborted, 1);
}

#[test]
fn test_max_attempts_aborts_training() {
    let store = MemoryProfileStore::new();
    let mut capture = ScriptedCapture::default();
    capture.push(rhythm(1.0));
    capture.push(CapturedSample::new("short", RHYTHM.to_vec()));

    let mut session_settings = settings(StrategyKind::Threshold, RetryPolicy::Reprompt);
    session_settings.max_attempts = 6;
    let mut session = controller(
        session_settings,
        capture,
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );

    match session.train().unwrap() {
        TrainOutcome::Aborted { recorded, reason } => {
            assert_eq!(recorded, 1);
            assert!(matches!(reason, GuardError::InsufficientData(_)));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(session.capture_source().captures(), 6);
    assert!(store.snapshot().is_none());
}

#[test]
fn test_model_session_grants_same_rhythm_and_rejects_slow_typist() {
    let store = MemoryProfileStore::new();
    let log = create_shared_log();
    let sink = Arc::new(CountingSink::default());
    let capture = ScriptedCapture::new([rhythm(0.95), rhythm(1.0), rhythm(1.05)]);

    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        capture,
        &store,
        sink.clone(),
        log.clone(),
    );
    assert!(matches!(session.train().unwrap(), TrainOutcome::Saved { .. }));

    let mut capture = ScriptedCapture::default();
    capture.push(rhythm(1.0));
    capture.push(rhythm(10.0));
    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        capture,
        &store,
        sink.clone(),
        log.clone(),
    );

    let granted = session.authenticate().unwrap();
    assert_eq!(granted.verdict(), Some(Verdict::Granted));
    assert_eq!(session.state(), SessionState::Menu);

    match session.authenticate().unwrap() {
        AuthOutcome::Rejected(Decision::Model { score, cutoff, .. }) => assert!(score > cutoff),
        other => panic!("expected model rejection, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Menu);

    session.wait_for_evidence();
    assert_eq!(sink.calls(), 1);
    assert_eq!(log.stats().access_granted, 1);
    assert_eq!(log.stats().access_rejected, 1);
    assert_eq!(log.stats().evidence_saved, 1);
}

#[test]
fn test_threshold_rejection_triggers_one_evidence_capture() {
    let store = MemoryProfileStore::with_profile(Profile::Threshold { avg_flight: 1.0 });
    let sink = Arc::new(CountingSink::default());
    let mut capture = ScriptedCapture::default();
    capture.push(typed(vec![1.2; 5]));
    capture.push(typed(vec![1.3; 5]));

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        capture,
        &store,
        sink.clone(),
        create_shared_log(),
    );

    match session.authenticate().unwrap() {
        AuthOutcome::Granted(Decision::Threshold { diff, .. }) => assert!((diff - 0.2).abs() < 1e-9),
        other => panic!("expected grant, got {other:?}"),
    }
    session.wait_for_evidence();
    assert_eq!(sink.calls(), 0);

    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Rejected));
    session.wait_for_evidence();
    assert_eq!(sink.calls(), 1);
}

#[test]
fn test_no_input_skips_decision() {
    let store = MemoryProfileStore::with_profile(Profile::Threshold { avg_flight: 0.2 });
    let log = create_shared_log();
    let sink = Arc::new(CountingSink::default());
    let mut capture = ScriptedCapture::default();
    capture.push_failure("no input detected");
    capture.push(CapturedSample::new(PHRASE, Vec::new()));

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        capture,
        &store,
        sink.clone(),
        log.clone(),
    );

    assert!(matches!(
        session.authenticate().unwrap(),
        AuthOutcome::NoInput(GuardError::CaptureFailure(_))
    ));
    match session.authenticate().unwrap() {
        AuthOutcome::NoInput(e) => {
            assert!(e.is_sample_error());
            assert!(matches!(e, GuardError::InsufficientData(_)));
        }
        other => panic!("expected no input, got {other:?}"),
    }

    session.wait_for_evidence();
    assert_eq!(sink.calls(), 0);
    assert_eq!(log.stats().no_input, 2);
    assert_eq!(log.stats().access_rejected, 0);
}

#[test]
fn test_missing_profile_is_reported_before_capture() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::new(dir.path().join("user_profile.json"));
    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.0)]),
        store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );

    assert!(matches!(
        session.authenticate(),
        Err(GuardError::ProfileNotFound { .. })
    ));
    assert_eq!(session.capture_source().captures(), 0);
    assert_eq!(session.state(), SessionState::Menu);
}

#[test]
fn test_corrupt_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_profile.json");
    std::fs::write(&path, "{}").unwrap();

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.0)]),
        JsonProfileStore::new(&path),
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );

    assert!(matches!(
        session.authenticate(),
        Err(GuardError::CorruptProfile(_))
    ));
}

#[test]
fn test_strategy_mismatch_is_invalid_profile() {
    let store = MemoryProfileStore::with_profile(Profile::Threshold { avg_flight: 0.2 });
    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.0)]),
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );

    assert!(matches!(
        session.authenticate(),
        Err(GuardError::InvalidProfile(_))
    ));
    assert_eq!(session.capture_source().captures(), 0);
}

#[test]
fn test_training_then_authentication_through_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles").join("user_profile.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();

    let capture = ScriptedCapture::new((0..5).map(|_| rhythm(1.0)));
    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        capture,
        JsonProfileStore::new(&path),
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert!(matches!(session.train().unwrap(), TrainOutcome::Saved { .. }));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("avg_flight").is_some());
    assert!(raw.get("flight_matrices").is_none());

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.1)]),
        JsonProfileStore::new(&path),
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Granted));
}

#[test]
fn test_failing_camera_leaves_session_usable() {
    let store = MemoryProfileStore::with_profile(Profile::Threshold { avg_flight: 1.0 });
    let log = create_shared_log();
    let sink = Arc::new(FailingSink::default());
    let mut capture = ScriptedCapture::default();
    capture.push(typed(vec![1.4; 5]));
    capture.push(typed(vec![1.1; 5]));

    let mut session = controller(
        settings(StrategyKind::Threshold, RetryPolicy::Reprompt),
        capture,
        &store,
        sink.clone(),
        log.clone(),
    );

    match session.authenticate().unwrap() {
        AuthOutcome::Rejected(decision) => assert_eq!(decision.verdict(), Verdict::Rejected),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Menu);

    session.wait_for_evidence();
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.stats().evidence_failed, 1);
    assert_eq!(log.stats().evidence_saved, 0);

    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Granted));
    assert_eq!(session.state(), SessionState::Menu);
    assert_eq!(store.snapshot(), Some(Profile::Threshold { avg_flight: 1.0 }));
}

#[test]
fn test_model_training_never_saves_fewer_than_three_samples() {
    let store = MemoryProfileStore::new();
    let mut session_settings = settings(StrategyKind::Model, RetryPolicy::Reprompt);
    session_settings.required_samples = 2;

    let capture = ScriptedCapture::new([rhythm(0.95), rhythm(1.0), rhythm(1.05)]);
    let mut session = controller(
        session_settings.clone(),
        capture,
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );

    match session.train().unwrap() {
        TrainOutcome::Saved {
            profile: Profile::Model { samples },
            ..
        } => assert_eq!(samples.len(), 3),
        other => panic!("expected model profile, got {other:?}"),
    }
    assert_eq!(session.capture_source().captures(), 3);

    let mut session = controller(
        session_settings,
        ScriptedCapture::new([rhythm(1.0)]),
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Granted));
}

#[test]
fn test_model_session_grants_held_out_sample() {
    let store = MemoryProfileStore::new();
    let capture = ScriptedCapture::new([rhythm(0.95), rhythm(1.0), rhythm(1.05)]);
    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        capture,
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert!(matches!(session.train().unwrap(), TrainOutcome::Saved { .. }));

    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.06), rhythm(0.97)]),
        &store,
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Granted));
    assert_eq!(session.authenticate().unwrap().verdict(), Some(Verdict::Granted));
}

#[test]
fn test_json_store_refuses_short_model_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_profile.json");
    std::fs::write(&path, r#"{"flight_matrices": [[0.2, 0.001, 2.0]]}"#).unwrap();

    let mut session = controller(
        settings(StrategyKind::Model, RetryPolicy::Reprompt),
        ScriptedCapture::new([rhythm(1.0)]),
        JsonProfileStore::new(&path),
        Arc::new(CountingSink::default()),
        create_shared_log(),
    );
    assert!(matches!(
        session.authenticate(),
        Err(GuardError::CorruptProfile(_))
    ));
    assert_eq!(session.capture_source().captures(), 0);
}
