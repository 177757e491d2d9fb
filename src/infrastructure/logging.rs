use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "DELOIST_LOG";
pub const COMMAND_LOG_FILE: &str = "commands.log";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON lines appended to `<logs_dir>/commands.log`.
pub fn command_log_subscriber(
    logs_dir: &Path,
    filter: EnvFilter,
) -> Result<impl tracing::Subscriber + Send + Sync, InfraError> {
    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(COMMAND_LOG_FILE))?;

    Ok(tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file)),
    ))
}

pub fn init_logging(logs_dir: &Path) -> Result<(), InfraError> {
    command_log_subscriber(logs_dir, log_filter())?
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("logging already initialized: {error}")))
}
