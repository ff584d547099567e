//! Keystroke Guardian CLI
//!
//! Typing-rhythm authentication from the terminal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use keystroke_guardian::{
    capture::KeyboardCapture,
    collector::check_permission,
    config::Config,
    core::Decision,
    evidence::{CommandCamera, EvidenceDispatcher},
    session::{AuthOutcome, SessionController, SessionEvent, SessionSettings, TrainOutcome},
    store::{JsonProfileStore, ProfileStore},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog},
    DecisionEngine, GuardError, PRIVACY_DECLARATION, VERSION,
};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

type Controller =
    SessionController<KeyboardCapture<BufReader<io::Stdin>, io::Stdout>, JsonProfileStore>;

#[derive(Parser)]
#[command(name = "keystroke-guardian")]
#[command(version = VERSION)]
#[command(about = "Authenticate users by the rhythm of their typing", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Interactive menu (default)
    Menu,

    /// Record samples and replace the stored profile
    Train,

    /// Make one authentication attempt
    Authenticate,

    /// Show profile and cumulative statistics
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },

    /// Display privacy declaration
    Privacy,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => cmd_menu(&config),
        Commands::Train => {
            let (mut controller, log) = build_controller(&config)?;
            run_train(&mut controller);
            save_stats(&log);
            Ok(())
        }
        Commands::Authenticate => {
            let (mut controller, log) = build_controller(&config)?;
            run_authenticate(&mut controller);
            controller.wait_for_evidence();
            save_stats(&log);
            Ok(())
        }
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config { init } => cmd_config(&config, &config_path, init),
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_controller(config: &Config) -> anyhow::Result<(Controller, SharedTransparencyLog)> {
    config
        .ensure_directories()
        .context("failed to create data directories")?;

    if !check_permission() {
        eprintln!("Warning: key timing is unavailable. On macOS grant Input Monitoring");
        eprintln!("permission to your terminal in System Settings > Privacy & Security.");
        eprintln!();
    }

    let log = create_shared_log_with_persistence(config.transparency_path());
    let camera = CommandCamera::new(&config.evidence.output_dir, config.evidence.command.clone());
    let evidence = EvidenceDispatcher::new(Arc::new(camera)).with_log(log.clone());
    let engine = DecisionEngine::new(config.strategy, config.tolerance, config.forest.into());

    let controller = SessionController::new(
        SessionSettings::from(config),
        engine,
        KeyboardCapture::stdio(config.settle_delay),
        JsonProfileStore::new(&config.profile_path),
        evidence,
        log.clone(),
    )
    .with_reporter(Box::new(print_event));

    Ok((controller, log))
}

fn print_event(event: &SessionEvent<'_>) {
    match event {
        SessionEvent::SampleRecorded { recorded, required } => {
            println!("✅ Sample Recorded. ({recorded}/{required})");
        }
        SessionEvent::SampleDiscarded { error } => {
            println!("❌ {error}. Try again.");
        }
        SessionEvent::EvidenceDispatched => {
            println!("📸 Capturing evidence...");
        }
    }
}

fn cmd_menu(config: &Config) -> anyhow::Result<()> {
    let (mut controller, log) = build_controller(config)?;

    let handler_log = log.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        save_stats(&handler_log);
        println!();
        println!("Goodbye.");
        std::process::exit(0);
    }) {
        warn!(error = %e, "could not install Ctrl+C handler");
    }

    println!("Keystroke Guardian v{VERSION}");
    println!("Strategy: {}", config.strategy);

    let stdin = io::stdin();
    loop {
        println!();
        println!("1. Train");
        println!("2. Authenticate");
        println!("3. Exit");
        print!("Select: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        if stdin.lock().read_line(&mut choice)? == 0 {
            break;
        }

        match choice.trim() {
            "1" => run_train(&mut controller),
            "2" => run_authenticate(&mut controller),
            "3" => break,
            _ => println!("Invalid option."),
        }
    }

    controller.wait_for_evidence();
    save_stats(&log);
    println!("Goodbye.");
    Ok(())
}

fn run_train(controller: &mut Controller) {
    let settings = controller.settings();
    println!();
    println!(
        "Training the {} strategy: type the phrase {} times.",
        settings.strategy, settings.required_samples
    );

    match controller.train() {
        Ok(TrainOutcome::Saved { profile, discarded }) => {
            println!();
            println!("Profile saved: {}", profile.describe());
            if discarded > 0 {
                println!("({discarded} samples were discarded along the way)");
            }
        }
        Ok(TrainOutcome::Aborted { recorded, reason }) => {
            println!();
            println!("Training aborted after {recorded} recorded samples: {reason}");
            println!("Your previous profile, if any, was kept.");
        }
        Err(e) => {
            println!();
            println!("Training failed: {e}");
        }
    }
}

fn run_authenticate(controller: &mut Controller) {
    println!();
    match controller.authenticate() {
        Ok(AuthOutcome::Granted(decision)) => {
            print_decision(&decision);
            println!("✅ ACCESS GRANTED");
        }
        Ok(AuthOutcome::Rejected(decision)) => {
            print_decision(&decision);
            println!("⛔ ACCESS DENIED");
        }
        Ok(AuthOutcome::NoInput(e)) => {
            println!("No input detected. ({e})");
        }
        Err(e) => print_auth_error(&e),
    }
}

fn print_decision(decision: &Decision) {
    match decision {
        Decision::Threshold {
            candidate_avg,
            profile_avg,
            diff,
            threshold,
            ..
        } => {
            println!("Your speed:   {candidate_avg:.4}s");
            println!("Stored speed: {profile_avg:.4}s");
            println!("Difference:   {diff:.4}s (limit {threshold:.4}s)");
        }
        Decision::Model { score, cutoff, .. } => {
            println!("Anomaly score: {score:.4} (cutoff {cutoff:.4})");
        }
    }
}

fn print_auth_error(error: &GuardError) {
    match error {
        GuardError::ProfileNotFound { .. } => {
            println!("No profile found. Choose Train first.");
        }
        e if e.is_profile_error() => {
            println!("The stored profile cannot be used: {e}");
            println!("Choose Train to record a new one.");
        }
        _ => println!("Authentication failed: {error}"),
    }
}

fn save_stats(log: &SharedTransparencyLog) {
    if let Err(e) = log.save() {
        warn!(error = %e, "failed to save transparency stats");
    }
}

fn cmd_status(config: &Config) {
    println!("Keystroke Guardian Status");
    println!("=========================");
    println!();

    let has_permission = check_permission();
    println!(
        "Key timing: {}",
        if has_permission {
            "available ✓"
        } else {
            "unavailable ✗"
        }
    );
    println!("Strategy: {}", config.strategy);
    println!();

    let store = JsonProfileStore::new(&config.profile_path);
    match store.load() {
        Ok(profile) => println!("Profile: {}", profile.describe()),
        Err(GuardError::ProfileNotFound { .. }) => println!("Profile: none (train first)"),
        Err(e) => println!("Profile: unusable ({e})"),
    }
    println!("Profile file: {}", config.profile_path.display());
    println!();

    let stats_path = config.transparency_path();
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        println!("{}", log.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config(config: &Config, path: &std::path::Path, init: bool) -> anyhow::Result<()> {
    if init {
        config
            .save_to(path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("failed to render configuration")?
    );
    Ok(())
}
