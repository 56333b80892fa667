//! HIVE CLI - multi-client session frontend.
//!
//! Brings the orchestration kernel up over the configured character
//! roster, bridges stdin/stdout to the session command channel, and
//! maps the session outcome to the process exit code.
//!
//! # Configuration
//!
//! Loaded in priority order:
//!
//! 1. CLI arguments (highest)
//! 2. Environment variables (`HIVE_*`)
//! 3. Config file (`hive.toml`, or `--config`)
//! 4. Defaults
//!
//! # Commands
//!
//! Lines on stdin are session commands: `kill`, `pause`, `resume`,
//! `hold`, `write <channel> <text>`, `stop`. Alerts from the session
//! print on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use hive_runtime::{
    CharacterProfile, ChannelBridge, ConfigLoader, SessionEngine, WorkerBlueprint,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// HIVE - multi-client game-automation session
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file path (default: hive.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Characters to run (overrides config)
    #[arg(short = 'C', long = "character")]
    characters: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log filter (also: HIVE_LOG, default "info")
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(args: &Args, debug: bool) {
    let default = if debug || args.debug { "debug" } else { "info" };
    let filter = args
        .log
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::try_from_env("HIVE_LOG").unwrap_or_else(|_| EnvFilter::new(default))
        });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> Result<bool> {
    // Layer the config: defaults ← file ← env ← CLI.
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path.clone());
    } else if std::path::Path::new("hive.toml").exists() {
        loader = loader.with_file("hive.toml");
    }
    let mut config = loader.load().context("configuration")?;
    if !args.characters.is_empty() {
        config.characters = args.characters.clone();
    }

    init_tracing(&args, config.debug);
    info!(characters = ?config.characters, "hive starting");

    if config.characters.is_empty() {
        anyhow::bail!("no characters configured; use --character or hive.toml");
    }

    // Stdin → inbound commands, outbound alerts → stdout.
    let (bridge, mut outbound, inbound_tx) = ChannelBridge::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && inbound_tx.send(trimmed.to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    tokio::spawn(async move {
        while let Some(relay) = outbound.recv().await {
            if let Some(text) = relay.message {
                println!("[hive] {text}");
            }
            if let Some(image) = relay.image {
                println!("[hive] <capture: {} bytes>", image.len());
            }
        }
    });

    // One blueprint per configured character. Game-specific decision
    // makers plug in through library use; the frontend validates the
    // profiles and runs the kernel shell.
    let mut engine = SessionEngine::new(Box::new(bridge))
        .with_pipe_capacity(config.pipe_capacity)
        .with_shutdown_grace(Duration::from_millis(config.shutdown_grace_ms))
        .with_warn_threshold(config.task_warn_threshold);

    for ign in &config.characters {
        let profile = CharacterProfile::load(&config.character_dir, ign)
            .with_context(|| format!("profile for '{ign}'"))?;
        info!(
            %ign,
            keys = profile.keys.len(),
            detection = profile.detection.len(),
            "character profile loaded"
        );
        engine = engine.with_worker(WorkerBlueprint::new(ign.clone()));
    }

    let control = engine.control();
    let session = tokio::spawn(engine.run());

    // Ctrl+C behaves like the kill command.
    let ctrl_c_control = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received");
            ctrl_c_control.request_shutdown("interrupt");
        }
    });

    let outcome = session.await.context("session task")?;
    match outcome {
        Ok(()) => {
            info!("session ended cleanly");
            Ok(true)
        }
        Err(err) => {
            error!(%err, "session ended with fatal");
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("hive: {err:#}");
            ExitCode::from(2)
        }
    }
}
