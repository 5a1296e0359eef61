//! Comms subsystem — owns the external chat channels.
//!
//! Each compiled-in channel (currently Discord, behind `channel-discord`)
//! captures the shared [`CommsDeps`] at construction and runs as an
//! independent task until the shutdown token fires. [`start`] is
//! synchronous: it returns a join handle as soon as the task is spawned,
//! and the caller decides when to await it.

pub mod router;
pub mod tracker;

#[cfg(feature = "channel-discord")]
pub mod discord;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::voice::VoiceManager;

use router::Router;

/// Everything a channel needs to service events: the command router and
/// the voice lifecycle manager. Channels get an `Arc` of this and nothing
/// else — gateway internals stay inside the channel.
pub struct CommsDeps {
    pub router: Router,
    /// `None` when no lobby channel is configured.
    pub voice: Option<VoiceManager>,
}

/// Spawn the configured comms channel and return its join handle.
///
/// With no channel compiled in or enabled, the subsystem parks until
/// shutdown so the process keeps the same lifecycle either way.
pub fn start(
    config: &Config,
    deps: Arc<CommsDeps>,
    shutdown: CancellationToken,
) -> JoinHandle<Result<(), AppError>> {
    #[cfg(feature = "channel-discord")]
    {
        if config.comms_discord_should_load() {
            info!("loading discord channel");
            return tokio::spawn(discord::run("discord0".to_string(), deps, shutdown));
        }
    }

    #[cfg(not(feature = "channel-discord"))]
    if config.comms_discord_should_load() {
        tracing::warn!("discord channel configured but not compiled in");
    }

    let _ = deps;
    info!("no comms channels configured — waiting for shutdown");
    tokio::spawn(async move {
        shutdown.cancelled().await;
        Ok(())
    })
}
