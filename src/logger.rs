//! Logging bootstrap via tracing-subscriber.
//!
//! [`init`] is called once from `main` after CLI flags and config are
//! resolved. `RUST_LOG` always wins unless the caller forces its level
//! (explicit `-v` flags on the command line).

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber, writing to stderr.
///
/// With `force_level` set, `level` beats `RUST_LOG`; otherwise `RUST_LOG`
/// is consulted first and `level` is the fallback. `level` takes the usual
/// strings (`"error"` through `"trace"`) or any `EnvFilter` directive.
pub fn init(level: &str, force_level: bool) -> Result<(), AppError> {
    let from_level = || {
        EnvFilter::try_new(level)
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    };

    let filter = if force_level {
        from_level()?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => from_level()?,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Validate a level string from config before it reaches [`init`].
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
