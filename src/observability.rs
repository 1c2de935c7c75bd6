//! Logging configuration, subscriber setup and pipeline stage events.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|name| env::var(name).ok())
}

/// `NHL_LOG_LEVEL`, `NHL_LOG_FORMAT` (`json`|`pretty`) and `NHL_LOG_TARGET`;
/// blank or unparsable values keep the default.
pub fn logging_config_from_lookup(var: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = var("NHL_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }
    if let Some(format) = var("NHL_LOG_FORMAT").as_deref().and_then(parse_log_format) {
        config.format = format;
    }
    if let Some(include_target) = var("NHL_LOG_TARGET").as_deref().and_then(parse_bool) {
        config.include_target = include_target;
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_stage_start(stage: &str, config: &LoggingConfig, nhl_root: &Path) {
    info!(
        component = "pipeline",
        event = "stage.start",
        stage,
        nhl_root = %nhl_root.display(),
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_stage_output(stage: &str, path: &Path, rows: usize, columns: Option<usize>) {
    match columns {
        Some(columns) => info!(
            component = "pipeline",
            event = "stage.output",
            stage,
            path = %path.display(),
            rows,
            columns
        ),
        None => info!(
            component = "pipeline",
            event = "stage.output",
            stage,
            path = %path.display(),
            rows
        ),
    }
}

pub fn log_stage_finish(stage: &str, elapsed_ms: u128) {
    info!(
        component = "pipeline",
        event = "stage.finish",
        stage,
        elapsed_ms = elapsed_ms as u64
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(logging_config_from_lookup(lookup(&[])), LoggingConfig::default());
    }

    #[test]
    fn reads_level_format_and_target() {
        let cfg = logging_config_from_lookup(lookup(&[
            ("NHL_LOG_LEVEL", " nhlproj=debug "),
            ("NHL_LOG_FORMAT", "JSON"),
            ("NHL_LOG_TARGET", "off"),
        ]));
        assert_eq!(cfg.level, "nhlproj=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let cfg = logging_config_from_lookup(lookup(&[
            ("NHL_LOG_LEVEL", "   "),
            ("NHL_LOG_FORMAT", "yaml"),
            ("NHL_LOG_TARGET", "sometimes"),
        ]));
        assert_eq!(cfg, LoggingConfig::default());
    }
}
