//! Structured logging setup.

use crate::config::ServiceConfig;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_TARGET: &str = "story_pipeline";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub json_format: bool,
    pub colorize: bool,
    pub log_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            colorize: true,
            log_targets: vec![DEFAULT_LOG_TARGET.to_string()],
        }
    }
}

impl LoggingConfig {
    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            level: parse_level(&config.log_level),
            json_format: config.log_json,
            colorize: !config.log_json,
            ..Self::default()
        }
    }

    /// Add a target (e.g. a binary crate name) to the filter.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.log_targets.push(target.into());
        self
    }
}

/// Map the service's level names onto tracing levels. `WARNING` and
/// `CRITICAL` have no direct tracing counterpart.
pub fn parse_level(level: &str) -> Level {
    match level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" | "CRITICAL" => Level::ERROR,
        _ => Level::INFO,
    }
}

const fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

fn build_filter_string(targets: &[String], level: Level) -> String {
    let level = level_to_str(level);
    if targets.is_empty() {
        return format!("{}={}", DEFAULT_LOG_TARGET, level);
    }
    targets
        .iter()
        .map(|t| format!("{}={}", t, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// filter. Calling this twice is harmless; the second call is ignored.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(build_filter_string(&config.log_targets, config.level)));

    let layer = fmt::layer()
        .with_ansi(config.colorize)
        .with_target(true)
        .with_writer(std::io::stderr);

    let layer = if config.json_format {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
}
