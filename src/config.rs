//! Configuration management

use std::{env, path::Path, sync::LazyLock, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pattern: `${VAR}` or `${VAR:-default}`
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static regex is valid")
});

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order; variables already set win.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// RAG service configuration
    pub rag: RagConfig,
    /// Failsafe configuration
    pub failsafe: FailsafeConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PHOENIXCARE_RAG__BASE_URL -> rag.base_url
        figment = figment.merge(Env::prefixed("PHOENIXCARE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // env files must be loaded before ${VAR} expansion
        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports `${VAR:-default}` and ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path_str = expand_string(path_str);
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str,
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in the service URL
    fn expand_env_vars(&mut self) {
        self.rag.base_url = expand_string(&self.rag.base_url);
    }

    /// Semantic checks serde cannot express
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.rag.base_url.trim().is_empty() {
            return Err(Error::Config("rag.base_url must not be empty".into()));
        }
        if !self.rag.base_url.starts_with("http://") && !self.rag.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "rag.base_url must be an http(s) URL, got '{}'",
                self.rag.base_url
            )));
        }
        let retry = &self.failsafe.retry;
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(Error::Config(
                "failsafe.retry.multiplier must be a finite number >= 1".into(),
            ));
        }
        if retry.initial_backoff > retry.max_backoff {
            return Err(Error::Config(
                "failsafe.retry.initial_backoff must not exceed max_backoff".into(),
            ));
        }
        if retry.attempt_timeout.is_zero() {
            return Err(Error::Config(
                "failsafe.retry.attempt_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string
fn expand_string(value: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

/// RAG service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Base URL of the RAG service (supports `${VAR:-default}`)
    pub base_url: String,
    /// Name of the shared circuit breaker
    pub breaker_name: String,
    /// Connect timeout for the HTTP client
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            base_url: "${PYTHON_API_URL:-http://localhost:8000}".to_string(),
            breaker_name: "rag-service".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Failsafe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FailsafeConfig {
    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration
    pub retry: RetryConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaker
    pub enabled: bool,
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Half-open successes needed to close
    pub success_threshold: u32,
    /// Time spent open before a trial call is admitted
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts, first one included
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Deadline for each attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (`30s`, or `250ms` when not whole seconds)
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
        } else {
            // Assume seconds
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}
