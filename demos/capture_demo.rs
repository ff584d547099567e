//! Demonstration of Keystroke Guardian timing capture.
//!
//! This example shows how to:
//! 1. Check that key timing is available
//! 2. Capture one typed sample with its flight times
//! 3. Validate it against a phrase
//! 4. Extract the (mean, variance, total) feature vector
//!
//! Run with: cargo run --example capture_demo
//!
//! Note: key timing requires Input Monitoring permission on macOS.

use std::time::Duration;

use keystroke_guardian::{
    capture::{CaptureSource, KeyboardCapture, SamplePrompt, SampleValidator},
    collector::check_permission,
    config::DEFAULT_TARGET_PHRASE,
    core::extract,
};

fn main() {
    println!("Keystroke Guardian - Capture Demo");
    println!("=================================");
    println!();

    print!("Checking key timing... ");
    if check_permission() {
        println!("OK ✓");
    } else {
        println!("UNAVAILABLE ✗");
        println!();
        println!("On macOS, add your terminal under");
        println!("System Settings > Privacy & Security > Input Monitoring");
        println!("and restart this demo.");
        return;
    }

    let mut capture = KeyboardCapture::stdio(Duration::from_millis(500));
    let prompt = SamplePrompt {
        title: "--- Demo sample ---".to_string(),
        phrase: DEFAULT_TARGET_PHRASE,
    };

    let sample = match capture.capture(&prompt) {
        Ok(sample) => sample,
        Err(e) => {
            eprintln!("Capture failed: {e}");
            return;
        }
    };

    println!();
    println!("Captured {} intervals:", sample.flight_times.len());
    for (i, flight) in sample.flight_times.as_slice().iter().enumerate() {
        println!("  {:>3}: {:.4}s", i + 1, flight);
    }

    let validator = SampleValidator {
        phrase: DEFAULT_TARGET_PHRASE.to_string(),
        exact_text: true,
        min_text_len: 10,
    };

    match validator.validate(sample).and_then(|times| extract(&times)) {
        Ok(features) => {
            println!();
            println!("Features:");
            println!("  mean:     {:.4}s", features.mean);
            println!("  variance: {:.6}", features.variance);
            println!("  total:    {:.4}s", features.total);
        }
        Err(e) => println!("Sample rejected: {e}"),
    }
}
