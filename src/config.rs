//! Service configuration.
//!
//! [`ServiceConfig`] is built once at startup (usually via
//! [`ServiceConfig::from_env`]) and passed by reference into each component.
//! Nothing in the pipeline reads the environment on its own.

use crate::backend::{BackoffConfig, JitterStrategy};
use crate::error::{PipelineError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sampling configuration for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0+ = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            json_mode: true,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

/// Deployment environment. Production redacts upstream details from errors
/// and requires a provider credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(PipelineError::InvalidConfig(format!(
                "ENVIRONMENT must be development, staging or production, got '{}'",
                other
            ))),
        }
    }
}

/// Provider connection and call settings.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    /// Bearer credential. `None` means the provider is not configured.
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling settings.
    pub llm: LlmConfig,
    /// Timeout for a single completion attempt.
    pub call_timeout: Duration,
    /// Timeout for the readiness probe.
    pub probe_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::backend::openai::DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            llm: LlmConfig::default(),
            call_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field(
                "api_key",
                &self.api_key.as_deref().map(crate::backend::openai::redact),
            )
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("llm", &self.llm)
            .field("call_timeout", &self.call_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

/// Everything the service needs, built once at process start.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub environment: Environment,
    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL.
    pub log_level: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    pub provider: ProviderConfig,
    pub backoff: BackoffConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_level: "INFO".to_string(),
            log_json: false,
            provider: ProviderConfig::default(),
            backoff: BackoffConfig::standard(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

impl ServiceConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys take defaults; present keys
    /// must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(env) = get("ENVIRONMENT") {
            config.environment = env.parse()?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level.to_uppercase();
        }
        if let Some(format) = get("LOG_FORMAT") {
            config.log_json = format.eq_ignore_ascii_case("json");
        }

        let provider = &mut config.provider;
        provider.api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            provider.base_url = url;
        }
        if let Some(model) = get("STORY_MODEL") {
            provider.model = model;
        }
        if let Some(v) = get("STORY_TEMPERATURE") {
            provider.llm.temperature = parse_value("STORY_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("STORY_MAX_TOKENS") {
            provider.llm.max_tokens = parse_value("STORY_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("STORY_CALL_TIMEOUT_SECS") {
            provider.call_timeout = Duration::from_secs(parse_value("STORY_CALL_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("STORY_PROBE_TIMEOUT_SECS") {
            provider.probe_timeout =
                Duration::from_secs(parse_value("STORY_PROBE_TIMEOUT_SECS", &v)?);
        }

        let backoff = &mut config.backoff;
        if let Some(v) = get("STORY_MAX_ATTEMPTS") {
            backoff.max_attempts = parse_value("STORY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("STORY_BACKOFF_BASE_MS") {
            backoff.base_delay = Duration::from_millis(parse_value("STORY_BACKOFF_BASE_MS", &v)?);
        }
        if let Some(v) = get("STORY_BACKOFF_MIN_MS") {
            backoff.min_delay = Duration::from_millis(parse_value("STORY_BACKOFF_MIN_MS", &v)?);
        }
        if let Some(v) = get("STORY_BACKOFF_MAX_MS") {
            backoff.max_delay = Duration::from_millis(parse_value("STORY_BACKOFF_MAX_MS", &v)?);
        }
        if let Some(v) = get("STORY_BACKOFF_JITTER") {
            backoff.jitter = match v.to_lowercase().as_str() {
                "none" => JitterStrategy::None,
                "full" => JitterStrategy::Full,
                "equal" => JitterStrategy::Equal,
                other => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "STORY_BACKOFF_JITTER must be none, full or equal, got '{}'",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings are coherent. Called by the loaders; call it
    /// yourself for hand-built configs.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "LOG_LEVEL must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }

        if let Some(key) = &self.provider.api_key {
            if !key.starts_with("sk-") || key.len() < 20 {
                return Err(PipelineError::InvalidConfig(
                    "OPENAI_API_KEY must start with 'sk-' and be at least 20 characters".into(),
                ));
            }
        } else if self.environment.is_production() {
            return Err(PipelineError::InvalidConfig(
                "OPENAI_API_KEY is required in production".into(),
            ));
        }

        let temp = self.provider.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            return Err(PipelineError::InvalidConfig(format!(
                "temperature must be within 0.0..=2.0, got {}",
                temp
            )));
        }
        if self.provider.call_timeout.is_zero() || self.provider.probe_timeout.is_zero() {
            return Err(PipelineError::InvalidConfig("timeouts must be non-zero".into()));
        }

        self.backoff.validate().map_err(PipelineError::InvalidConfig)
    }

    /// Names of settings that are missing for full operation.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.provider.api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        missing
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| PipelineError::InvalidConfig(format!("invalid value for {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "sk-abcdefghijklmnopqrstuvwxyz";

    fn load(pairs: &[(&str, &str)]) -> Result<ServiceConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.provider.call_timeout, Duration::from_secs(30));
        assert_eq!(config.provider.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.backoff.min_delay, Duration::from_secs(2));
        assert_eq!(config.backoff.max_delay, Duration::from_secs(10));
        assert_eq!(config.missing_settings(), vec!["OPENAI_API_KEY"]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("OPENAI_API_KEY", KEY),
            ("STORY_MODEL", "gpt-4o-mini"),
            ("STORY_TEMPERATURE", "0.2"),
            ("STORY_MAX_ATTEMPTS", "5"),
            ("STORY_BACKOFF_MIN_MS", "500"),
            ("STORY_BACKOFF_JITTER", "none"),
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.llm.temperature, 0.2);
        assert_eq!(config.backoff.max_attempts, 5);
        assert_eq!(config.backoff.min_delay, Duration::from_millis(500));
        assert_eq!(config.backoff.jitter, JitterStrategy::None);
        assert_eq!(config.log_level, "DEBUG");
        assert!(config.log_json);
        assert!(config.missing_settings().is_empty());
    }

    #[test]
    fn test_production_requires_key() {
        let err = load(&[("ENVIRONMENT", "production")]).unwrap_err();
        assert!(err.to_string().contains("required in production"));
        assert!(load(&[("ENVIRONMENT", "production"), ("OPENAI_API_KEY", KEY)]).is_ok());
    }

    #[test]
    fn test_bad_key_format_rejected() {
        assert!(load(&[("OPENAI_API_KEY", "pk-abcdefghijklmnopqrstuv")]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "sk-short")]).is_err());
    }

    #[test]
    fn test_unparseable_values_rejected() {
        assert!(load(&[("STORY_MAX_TOKENS", "lots")]).is_err());
        assert!(load(&[("ENVIRONMENT", "qa")]).is_err());
        assert!(load(&[("LOG_LEVEL", "LOUD")]).is_err());
        assert!(load(&[("STORY_TEMPERATURE", "3.5")]).is_err());
        assert!(load(&[("STORY_BACKOFF_MIN_MS", "20000")]).is_err());
        assert!(load(&[("STORY_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("STORY_BACKOFF_BASE_MS", "0")]).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = load(&[("OPENAI_API_KEY", KEY)]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(KEY));
    }
}
