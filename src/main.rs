//! voxloop - voice-driven command loop
//!
//! Listens on the default microphone, routes what it hears to a small set
//! of commands and answers through whichever speech backend works here.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxloop::backends;
use voxloop::browser::SystemBrowser;
use voxloop::clock::SystemClock;
use voxloop::config_loader::{self, Settings};
use voxloop::ear::Ear;
use voxloop::engine::{AudioOutput, SpeechOutputChain};
use voxloop::host::HostFamily;
use voxloop::microphone::Microphone;
use voxloop::session::{AssistantSession, SessionEnd, SessionOptions};
use voxloop::transcriber::CommandTranscriber;

/// Voice assistant with a cascading text-to-speech fallback chain
#[derive(Parser)]
#[command(name = "voxloop")]
#[command(version)]
#[command(about = "Voice-driven command loop", long_about = None)]
struct Cli {
    /// Extra config file, merged over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the startup voice test
    #[arg(long, global = true)]
    no_self_test: bool,

    /// Only print responses, never synthesize
    #[arg(long, global = true)]
    print_only: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the assistant (default)
    Run,

    /// Speak text once through the TTS chain
    Say {
        /// Text to speak
        text: String,
    },

    /// Show which speech backends are usable on this host
    Doctor,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => {
            let settings = Settings::load(Some(path.as_path()))
                .with_context(|| format!("loading {}", path.display()))?;
            if let Ok(mut global) = config_loader::SETTINGS.write() {
                *global = settings.clone();
            }
            Ok(settings)
        }
        None => config_loader::SETTINGS
            .read()
            .map(|s| s.clone())
            .map_err(|_| anyhow::anyhow!("settings lock poisoned")),
    }
}

fn build_chain(settings: &Settings, host: HostFamily, print_only: bool) -> SpeechOutputChain {
    if print_only {
        SpeechOutputChain::print_only()
    } else {
        SpeechOutputChain::from_settings(settings, host)
    }
}

fn doctor(settings: &Settings, host: HostFamily) {
    println!("voxloop doctor");
    println!("──────────────");
    println!("Host family:  {}", host);
    for backend in backends::all_backends(settings) {
        let applies = backend.applies_to(host);
        let installed = match backend.program() {
            Some(program) => which::which(program).is_ok(),
            None => true,
        };
        let disabled = settings.disabled_backends.iter().any(|d| d == backend.id());
        let status = match (applies, installed, disabled) {
            (false, _, _) => "not for this host",
            (true, _, true) => "disabled",
            (true, true, false) => "ready",
            (true, false, false) => "missing",
        };
        println!(
            "  {:<16} {:<18} {}",
            backend.id(),
            status,
            backend.program().unwrap_or("-")
        );
    }
    println!("  {:<16} {:<18} -", "print", "ready");

    for program in ["vosk-transcriber", "whisper"] {
        let status = if which::which(program).is_ok() { "ready" } else { "missing" };
        println!("STT {:<12} {}", program, status);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(cli.config.as_ref())?;
    let host = HostFamily::detect();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Say { text } => {
            let chain = build_chain(&settings, host, cli.print_only);
            tokio::task::spawn_blocking(move || chain.speak(&text)).await?;
        }
        Commands::Doctor => doctor(&settings, host),
        Commands::Run => {
            println!("Starting Voice Assistant...");
            let chain = build_chain(&settings, host, cli.print_only);
            info!("speech tiers: {:?}", chain.tiers());

            let ear = Ear::new(
                Arc::new(Microphone::new(Duration::from_millis(
                    settings.silence_duration_ms,
                ))),
                Arc::new(CommandTranscriber::new(
                    &settings.stt_backend,
                    &settings.whisper_model,
                )),
                &settings,
            );

            let mut options = SessionOptions::from_settings(&settings);
            if cli.no_self_test {
                options.self_test = false;
            }

            let session = AssistantSession::new(
                Arc::new(chain),
                Arc::new(ear),
                Arc::new(SystemBrowser::new(host)),
                Arc::new(SystemClock),
                options,
            );

            // First Ctrl+C asks the loop to stop; a second one exits at once
            let cancel = session.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, shutting down after this cycle");
                    cancel.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });

            let end = tokio::task::spawn_blocking(move || session.run()).await?;
            match end {
                SessionEnd::ExitRequested => info!("session ended by request"),
                SessionEnd::Interrupted => info!("session interrupted"),
            }
        }
    }

    Ok(())
}
