//! Invite Guard CLI
//!
//! Submits invite codes against a local registry and manages the lockout that
//! follows too many invalid attempts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use invite_guard_core::{
    Config, CountdownBroadcaster, CountdownEvent, CountdownTask, CountdownTimer, FileStore,
    GuardError, InviteGate, InviteRegistry, LockoutPolicy, LockoutState, RemainingDuration,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Exit code for a submission that was refused.
const EXIT_REJECTED: u8 = 2;

/// Invite Guard - invite-code entry with attempt lockout
///
/// Ten invalid invite codes in a row block further entry for one hour.
#[derive(Parser, Debug)]
#[command(name = "invite-guard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: invite-guard.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an invite code
    Submit {
        /// The 20-character invite code
        #[arg(value_name = "CODE")]
        code: String,
    },
    /// Show the attempt counter and lockout state
    Status,
    /// Count down an active lockout until it ends
    Countdown,
    /// Clear the attempt counter and any lockout
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let (config, base_dir) = load_config(args.config.as_deref())?;
    let store_path = config.store_path(&base_dir);
    tracing::debug!(store = %store_path.display(), "Lockout store");
    let policy = LockoutPolicy::new(Arc::new(FileStore::new(store_path)));

    match args.command {
        Command::Submit { code } => {
            let registry = InviteRegistry::load_from_file(&config.invites_path(&base_dir))?;
            let gate = InviteGate::new(Arc::new(registry), policy);
            submit(&gate, &code)
        }
        Command::Status => {
            print_status(&policy);
            Ok(ExitCode::SUCCESS)
        }
        Command::Countdown => {
            run_countdown(policy, &config).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset => {
            policy.reset();
            println!("Invite-code entry unlocked");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads configuration and the directory relative paths resolve against.
fn load_config(config_path: Option<&str>) -> anyhow::Result<(Config, PathBuf)> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            let config = Config::load_from_file(path)?;
            let base = path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            Ok((config, base))
        }
        None => Ok((Config::load()?, PathBuf::from("."))),
    }
}

/// Submits a code and prints the outcome.
fn submit(gate: &InviteGate, code: &str) -> anyhow::Result<ExitCode> {
    match gate.submit(code) {
        Ok(()) => {
            println!("Invite-code accepted");
            Ok(ExitCode::SUCCESS)
        }
        Err(GuardError::LockoutActive { expires_at }) => {
            match expires_at {
                Some(expires_at) => println!(
                    "Invite-code entry is blocked for one hour. Try again in {}",
                    RemainingDuration::between(expires_at, Utc::now())
                ),
                None => println!("Invite-code entry is blocked for one hour"),
            }
            Ok(ExitCode::from(EXIT_REJECTED))
        }
        Err(e) if !e.is_fatal() => {
            println!("{e}");
            Ok(ExitCode::from(EXIT_REJECTED))
        }
        Err(e) => Err(e.into()),
    }
}

/// Prints the attempt counter and lockout state.
fn print_status(policy: &LockoutPolicy) {
    println!("Invalid attempts: {}", policy.attempts());
    match policy.lockout_state() {
        LockoutState::Unlocked => println!("Lockout: none"),
        LockoutState::Locked { expires_at } => {
            println!("Lockout: active until {}", expires_at.to_rfc3339());
            println!(
                "Remaining: {}",
                RemainingDuration::between(expires_at, Utc::now())
            );
        }
    }
}

/// Runs the countdown until expiry or Ctrl+C.
async fn run_countdown(policy: LockoutPolicy, config: &Config) {
    if !policy.is_locked() {
        println!("No active lockout");
        return;
    }

    let timer = CountdownTimer::new(
        policy,
        Arc::new(|| tracing::info!("Redirecting to invite-code entry")),
    );

    let broadcaster = CountdownBroadcaster::default();
    let mut events = broadcaster.subscribe();
    let task = CountdownTask::spawn(timer, config.tick_period(), broadcaster);

    loop {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping countdown");
                task.cancel();
                println!();
                println!("Countdown stopped. The lockout is still active.");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(CountdownEvent::Started { expires_at }) => {
                        println!("Invite-code entry is blocked until {}", expires_at.to_rfc3339());
                    }
                    Ok(event @ CountdownEvent::Tick { .. }) => {
                        if let Some(shown) = countdown_display(&event) {
                            print!("\r{shown}");
                            std::io::stdout().flush().ok();
                        }
                    }
                    Ok(event @ CountdownEvent::Expired) => {
                        if let Some(shown) = countdown_display(&event) {
                            println!("\r{shown}");
                        }
                        println!("Lockout over. You can enter an invite code again.");
                        break;
                    }
                    Ok(CountdownEvent::Cancelled) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Countdown display lagged");
                    }
                }
            }
        }
    }

    let outcome = task.join().await;
    tracing::debug!(?outcome, "Countdown finished");
}

/// Time shown for a countdown event. Expiry shows zero.
fn countdown_display(event: &CountdownEvent) -> Option<RemainingDuration> {
    match event {
        CountdownEvent::Tick { remaining } => Some(*remaining),
        CountdownEvent::Expired => Some(RemainingDuration::ZERO),
        CountdownEvent::Started { .. } | CountdownEvent::Cancelled => None,
    }
}
