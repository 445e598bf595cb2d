use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Installs the global subscriber. Returns an error if one is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match (config.format.as_str(), &config.file_path) {
        ("json", Some(file_path)) => {
            let file = open_log_file(file_path)?;
            registry
                .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE).with_writer(Mutex::new(file)))
                .try_init()?;
        }
        ("json", None) => {
            registry
                .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
                .try_init()?;
        }
        (_, Some(file_path)) => {
            let file = open_log_file(file_path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?;
        }
        (_, None) => {
            registry.with(fmt::layer().with_target(true)).try_init()?;
        }
    }

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}

fn open_log_file(file_path: &str) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?)
}
