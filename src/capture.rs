//! Timing capture adapter.
//!
//! Turns the key listener's timestamped presses into flight times and checks
//! the typed text against the target phrase. Two threads cooperate during a
//! capture: the listener thread receives key-down events while the foreground
//! thread reads the echoed line from the terminal. Callers see a single
//! blocking [`CaptureSource::capture`] call.

use crate::collector::{Collector, KeyPress};
use crate::core::features::FlightTimes;
use crate::error::{GuardError, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;
use tracing::debug;

/// Raw result of one capture: intervals plus what the user typed.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSample {
    pub flight_times: FlightTimes,
    pub typed_text: String,
}

impl CapturedSample {
    pub fn new(typed_text: impl Into<String>, flight_times: impl Into<FlightTimes>) -> Self {
        Self {
            flight_times: flight_times.into(),
            typed_text: typed_text.into(),
        }
    }
}

/// What to show the user before a capture.
#[derive(Debug, Clone)]
pub struct SamplePrompt<'a> {
    pub title: String,
    pub phrase: &'a str,
}

/// Source of typed samples.
pub trait CaptureSource {
    fn capture(&mut self, prompt: &SamplePrompt<'_>) -> Result<CapturedSample>;
}

impl<C: CaptureSource + ?Sized> CaptureSource for Box<C> {
    fn capture(&mut self, prompt: &SamplePrompt<'_>) -> Result<CapturedSample> {
        (**self).capture(prompt)
    }
}

/// Flight-time state for one capture.
///
/// Intervals are measured between consecutive typing presses; the Return
/// press only ends the sample.
#[derive(Debug, Default)]
pub struct FlightRecorder {
    last_timestamp: Option<DateTime<Utc>>,
    flight_times: Vec<f64>,
    finished: bool,
}

impl FlightRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one press. Returns `true` once Return has been seen.
    pub fn record(&mut self, press: &KeyPress) -> bool {
        if self.finished {
            return true;
        }
        if press.is_return() {
            self.finished = true;
            return true;
        }

        if let Some(last) = self.last_timestamp {
            let micros = (press.timestamp - last).num_microseconds().unwrap_or(0);
            self.flight_times.push(micros.max(0) as f64 / 1_000_000.0);
        }
        self.last_timestamp = Some(press.timestamp);
        false
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish(self) -> FlightTimes {
        FlightTimes::new(self.flight_times)
    }
}

/// Flight times of a complete press sequence.
pub fn flight_times_from_presses(presses: &[KeyPress]) -> FlightTimes {
    let mut recorder = FlightRecorder::new();
    for press in presses {
        if recorder.record(press) {
            break;
        }
    }
    recorder.finish()
}

/// Validation rules applied to every captured sample.
#[derive(Debug, Clone)]
pub struct SampleValidator {
    pub phrase: String,
    pub exact_text: bool,
    pub min_text_len: usize,
}

impl SampleValidator {
    /// Accept a sample, returning its flight times, or say why it is discarded.
    pub fn validate(&self, sample: CapturedSample) -> Result<FlightTimes> {
        let typed = sample.typed_text.trim_end_matches(['\r', '\n']);
        let typed_len = typed.chars().count();

        if typed_len < self.min_text_len {
            return Err(GuardError::InsufficientData(format!(
                "input too short ({typed_len} characters, at least {} required)",
                self.min_text_len
            )));
        }

        if self.exact_text && typed != self.phrase {
            return Err(GuardError::TextMismatch);
        }

        if sample.flight_times.is_empty() {
            return Err(GuardError::InsufficientData(
                "no keystrokes were captured".to_string(),
            ));
        }

        // More intervals than characters means corrections were typed.
        if self.exact_text && sample.flight_times.len() > typed_len.saturating_sub(1) {
            return Err(GuardError::TextMismatch);
        }

        Ok(sample.flight_times)
    }
}

/// Live capture from the keyboard and the terminal.
pub struct KeyboardCapture<R, W> {
    collector: Collector,
    input: R,
    output: W,
    settle_delay: Duration,
}

impl KeyboardCapture<BufReader<std::io::Stdin>, std::io::Stdout> {
    pub fn stdio(settle_delay: Duration) -> Self {
        // A one-byte buffer never reads past the newline, so whatever follows
        // stays in stdin for the menu.
        let input = BufReader::with_capacity(1, std::io::stdin());
        Self::new(input, std::io::stdout(), settle_delay)
    }
}

impl<R: BufRead, W: Write> KeyboardCapture<R, W> {
    pub fn new(input: R, output: W, settle_delay: Duration) -> Self {
        Self {
            collector: Collector::new(),
            input,
            output,
            settle_delay,
        }
    }

    fn write_prompt(&mut self, prompt: &SamplePrompt<'_>) -> std::io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", prompt.title)?;
        writeln!(self.output, "Please type: '{}'", prompt.phrase)?;
        self.output.flush()
    }

    fn io_failure(e: std::io::Error) -> GuardError {
        GuardError::CaptureFailure(e.to_string())
    }
}

impl<R: BufRead, W: Write> CaptureSource for KeyboardCapture<R, W> {
    fn capture(&mut self, prompt: &SamplePrompt<'_>) -> Result<CapturedSample> {
        self.write_prompt(prompt).map_err(Self::io_failure)?;

        // Let the Enter press that chose the menu option go by.
        std::thread::sleep(self.settle_delay);
        while self.collector.receiver().try_recv().is_ok() {}

        self.collector
            .start()
            .map_err(|e| GuardError::CaptureFailure(e.to_string()))?;

        write!(self.output, "Start typing (press ENTER when done): ").map_err(Self::io_failure)?;
        self.output.flush().map_err(Self::io_failure)?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line);
        self.collector.stop();

        match read {
            Ok(0) => return Err(GuardError::CaptureFailure("input closed".to_string())),
            Ok(_) => {}
            Err(e) => return Err(Self::io_failure(e)),
        }

        let mut recorder = FlightRecorder::new();
        while let Ok(press) = self.collector.receiver().try_recv() {
            if recorder.record(&press) {
                break;
            }
        }
        let flight_times = recorder.finish();

        debug!(
            intervals = flight_times.len(),
            typed_chars = line.trim_end().chars().count(),
            "capture complete"
        );

        Ok(CapturedSample {
            flight_times,
            typed_text: line.trim_end_matches(['\r', '\n']).to_string(),
        })
    }
}

/// Replays prepared samples in order; an exhausted script fails the capture.
#[derive(Debug, Default)]
pub struct ScriptedCapture {
    samples: VecDeque<Result<CapturedSample>>,
    captures: usize,
}

impl ScriptedCapture {
    pub fn new(samples: impl IntoIterator<Item = CapturedSample>) -> Self {
        Self {
            samples: samples.into_iter().map(Ok).collect(),
            captures: 0,
        }
    }

    pub fn push(&mut self, sample: CapturedSample) {
        self.samples.push_back(Ok(sample));
    }

    pub fn push_failure(&mut self, message: &str) {
        self.samples
            .push_back(Err(GuardError::CaptureFailure(message.to_string())));
    }

    /// Number of capture calls made so far.
    pub fn captures(&self) -> usize {
        self.captures
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl CaptureSource for ScriptedCapture {
    fn capture(&mut self, _prompt: &SamplePrompt<'_>) -> Result<CapturedSample> {
        self.captures += 1;
        self.samples
            .pop_front()
            .unwrap_or_else(|| Err(GuardError::CaptureFailure("no input detected".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::KeyKind;
    use chrono::Duration as ChronoDuration;

    const PHRASE: &str = "The quick brown fox";

    fn validator() -> SampleValidator {
        SampleValidator {
            phrase: PHRASE.to_string(),
            exact_text: true,
            min_text_len: 10,
        }
    }

    fn presses(offsets_ms: &[i64], finish: bool) -> Vec<KeyPress> {
        let start = Utc::now();
        let mut presses: Vec<KeyPress> = offsets_ms
            .iter()
            .map(|&ms| KeyPress::at(start + ChronoDuration::milliseconds(ms), KeyKind::Typing))
            .collect();
        if finish {
            let last = offsets_ms.last().copied().unwrap_or(0) + 150;
            presses.push(KeyPress::at(
                start + ChronoDuration::milliseconds(last),
                KeyKind::Return,
            ));
        }
        presses
    }

    #[test]
    fn test_recorder_measures_intervals() {
        let times = flight_times_from_presses(&presses(&[0, 120, 300, 360], true));
        let expected = [0.12, 0.18, 0.06];
        assert_eq!(times.len(), 3);
        for (got, want) in times.as_slice().iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_recorder_stops_at_return() {
        let mut all = presses(&[0, 100], true);
        all.push(KeyPress::new(KeyKind::Typing));

        let mut recorder = FlightRecorder::new();
        let mut count = 0;
        for press in &all {
            count += 1;
            if recorder.record(press) {
                break;
            }
        }
        assert_eq!(count, 3);
        assert!(recorder.is_finished());
        assert_eq!(recorder.finish().len(), 1);
    }

    #[test]
    fn test_single_press_has_no_intervals() {
        assert!(flight_times_from_presses(&presses(&[0], true)).is_empty());
    }

    #[test]
    fn test_validate_accepts_matching_sample() {
        let sample = CapturedSample::new(PHRASE, vec![0.2; 18]);
        let times = validator().validate(sample).unwrap();
        assert_eq!(times.len(), 18);
    }

    #[test]
    fn test_validate_rejects_mismatch() {
        let sample = CapturedSample::new("The quick brown cat", vec![0.2; 18]);
        assert!(matches!(
            validator().validate(sample),
            Err(GuardError::TextMismatch)
        ));
    }

    #[test]
    fn test_validate_rejects_short_input() {
        let sample = CapturedSample::new("The", vec![0.2; 2]);
        assert!(matches!(
            validator().validate(sample),
            Err(GuardError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_keystrokes() {
        let sample = CapturedSample::new(PHRASE, Vec::new());
        assert!(matches!(
            validator().validate(sample),
            Err(GuardError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_validate_rejects_corrected_typing() {
        // 19 characters allow at most 18 intervals
        let sample = CapturedSample::new(PHRASE, vec![0.2; 22]);
        assert!(matches!(
            validator().validate(sample),
            Err(GuardError::TextMismatch)
        ));
    }

    #[test]
    fn test_length_only_validation() {
        let relaxed = SampleValidator {
            exact_text: false,
            ..validator()
        };
        let sample = CapturedSample::new("something else entirely", vec![0.2; 30]);
        assert_eq!(relaxed.validate(sample).unwrap().len(), 30);
    }

    #[test]
    fn test_scripted_capture_exhausts() {
        let prompt = SamplePrompt {
            title: "test".to_string(),
            phrase: PHRASE,
        };
        let mut source = ScriptedCapture::new([CapturedSample::new(PHRASE, vec![0.2])]);
        source.push_failure("listener gone");

        assert!(source.capture(&prompt).is_ok());
        assert!(matches!(
            source.capture(&prompt),
            Err(GuardError::CaptureFailure(_))
        ));
        assert!(matches!(
            source.capture(&prompt),
            Err(GuardError::CaptureFailure(_))
        ));
        assert_eq!(source.captures(), 3);
    }

    #[test]
    fn test_keyboard_capture_reports_closed_input() {
        let mut capture = KeyboardCapture::new(&b""[..], Vec::new(), Duration::ZERO);
        let prompt = SamplePrompt {
            title: "--- Sample 1/5 ---".to_string(),
            phrase: PHRASE,
        };
        assert!(matches!(
            capture.capture(&prompt),
            Err(GuardError::CaptureFailure(_))
        ));
    }
}
