//! Nelum Bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config
//!   4. Init logger (CLI `-v` flags > env > config)
//!   5. Open the command store, build registry/tracker/voice manager
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run comms channels until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use nelum_bot::config;
use nelum_bot::error::AppError;
use nelum_bot::logger;
use nelum_bot::subsystems::commands::{CommandRegistry, store::CommandStore};
use nelum_bot::subsystems::comms::{self, CommsDeps, router::Router, tracker::MessageTracker};
use nelum_bot::subsystems::voice::VoiceManager;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        log_level = %effective_log_level,
        trigger = %config.trigger,
        "config loaded"
    );

    let store = CommandStore::open(&config.work_dir)?;
    let registry = Arc::new(CommandRegistry::new(store));
    let tracker = Arc::new(MessageTracker::new());
    let router = Router::new(registry, tracker, config.trigger);

    let voice = config.voice.lobby_channel_id.map(VoiceManager::new);
    if let Some(lobby) = config.voice.lobby_channel_id {
        info!(%lobby, "voice lifecycle enabled");
    } else {
        info!("no lobby channel configured — voice lifecycle disabled");
    }

    let deps = Arc::new(CommsDeps { router, voice });

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let comms = comms::start(&config, deps, shutdown.clone());
    let result = match comms.await {
        Ok(r) => r,
        Err(e) => Err(AppError::Comms(format!("comms task panicked: {e}"))),
    };

    // If the channel exited on its own (EOF, gateway error), still signal
    // everything else to stop.
    shutdown.cancel();

    result
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: nelum-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn   (suppress info noise, show warnings+errors only)
    //   -vv     → info   (normal operational output — the typical default)
    //   -vvv    → debug  (flow-level diagnostics: routing, drain checks)
    //   -vvvv+  → trace  (full payload dumps, very verbose)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
