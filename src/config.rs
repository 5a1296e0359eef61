//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `NELUM_WORK_DIR` and `NELUM_LOG_LEVEL` env overrides.
//! Secrets (the gateway token) never live in the TOML; they come from the
//! environment only.

use std::{env, fs, path::{Path, PathBuf}};

use serde::Deserialize;

use crate::error::AppError;
use crate::platform::ChannelId;

/// Discord channel configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Whether the Discord channel is explicitly enabled.
    pub enabled: bool,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub discord: DiscordConfig,
}

/// Voice subsystem configuration.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// The lobby channel whose entry provisions a personal voice channel.
    /// `None` disables the voice lifecycle entirely.
    pub lobby_channel_id: Option<ChannelId>,
}

/// Fully-resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Command trigger character, e.g. `!`.
    pub trigger: char,
    pub comms: CommsConfig,
    pub voice: VoiceConfig,
}

impl Config {
    /// Returns `true` if the Discord channel should be loaded.
    pub fn comms_discord_should_load(&self) -> bool {
        self.comms.discord.enabled
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    voice: RawVoice,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    work_dir: String,
    log_level: String,
    #[serde(default = "default_trigger")]
    trigger: String,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    discord: RawDiscord,
}

#[derive(Deserialize)]
struct RawDiscord {
    /// Defaults to `false`: Discord must be explicitly enabled.
    #[serde(default = "default_false")]
    enabled: bool,
}

impl Default for RawDiscord {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[derive(Deserialize, Default)]
struct RawVoice {
    /// Raw snowflake of the lobby voice channel.
    lobby_channel_id: Option<u64>,
}

fn default_trigger() -> String {
    "!".to_string()
}

fn default_false() -> bool {
    false
}

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("NELUM_WORK_DIR").ok();
    let log_level_override = env::var("NELUM_LOG_LEVEL").ok();
    load_from(
        Path::new(path.unwrap_or("config/default.toml")),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let b = parsed.bot;

    let work_dir_str = work_dir_override.unwrap_or(&b.work_dir).to_string();
    let work_dir = expand_home(&work_dir_str);
    let log_level = log_level_override.unwrap_or(&b.log_level).to_string();

    let mut trigger_chars = b.trigger.chars();
    let trigger = match (trigger_chars.next(), trigger_chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(AppError::Config(format!(
                "trigger must be exactly one character, got {:?}",
                b.trigger
            )));
        }
    };

    Ok(Config {
        bot_name: b.name,
        work_dir,
        log_level,
        trigger,
        comms: CommsConfig {
            discord: DiscordConfig {
                enabled: parsed.comms.discord.enabled,
            },
        },
        voice: VoiceConfig {
            lobby_channel_id: parsed.voice.lobby_channel_id.map(ChannelId),
        },
    })
}

/// Expand a leading `~`/`~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
