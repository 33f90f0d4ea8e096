//! Tracing setup shared by the binaries.
//!
//! Environment variables take precedence over the `[logging]` section:
//! - `RULEFLOW_LOG_LEVEL`: filter directive, e.g. `debug` or `ruleflow=trace`
//! - `RULEFLOW_LOG_JSON`: `1` for JSON lines, `0` for compact text
//! - `RULEFLOW_LOG_FILE`: append to this file instead of stderr

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::config::LoggingConfig;

static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Settings after applying environment overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl TraceSettings {
    pub fn resolve(config: &LoggingConfig) -> Self {
        Self::resolve_with(config, |name| env::var(name).ok())
    }

    fn resolve_with(config: &LoggingConfig, var: impl Fn(&str) -> Option<String>) -> Self {
        let level = var("RULEFLOW_LOG_LEVEL").unwrap_or_else(|| config.level.clone());
        let json = var("RULEFLOW_LOG_JSON").map_or_else(|| config.format == "json", |v| v != "0");
        let file = var("RULEFLOW_LOG_FILE")
            .map(PathBuf::from)
            .or_else(|| config.file.clone());
        Self { level, json, file }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    let settings = TraceSettings::resolve(config);

    let (writer, guard): (NonBlocking, WorkerGuard) = match &settings.file {
        Some(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!(
                    "ERROR: Unable to open log file '{}': {e}; logging to stderr",
                    path.display()
                );
                tracing_appender::non_blocking(std::io::stderr())
            }
        },
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    if TRACE_GUARD.set(guard).is_err() {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_new(&settings.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let ansi = settings.file.is_none() && !settings.json;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(writer);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if settings.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
