use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable overriding `openweather.api_key`.
pub const ENV_OPENWEATHER_API_KEY: &str = "OPENWEATHER_API_KEY";
/// Environment variable overriding `recaptcha.secret`.
pub const ENV_RECAPTCHA_SECRET: &str = "RECAPTCHA_SECRET_KEY";
/// Environment variable overriding `server.bind_addr`.
pub const ENV_BIND_ADDR: &str = "SKYBOARD_BIND_ADDR";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a one-line message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub openweather: OpenWeatherConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub subscriptions: SubscriptionConfig,

    #[serde(default)]
    pub recaptcha: RecaptchaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP/WebSocket listener binds to
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWeatherConfig {
    /// API key bound to every provider request (usually set via environment)
    #[serde(default)]
    pub api_key: String,

    /// Provider base URL; overridden in tests
    #[serde(default = "default_openweather_base_url")]
    pub base_url: String,

    /// Hard timeout for each provider request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Unit system passed to the provider
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_openweather_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_units() -> String {
    "metric".to_string()
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openweather_base_url(),
            timeout_secs: default_timeout_secs(),
            units: default_units(),
        }
    }
}

impl OpenWeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached payload
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Period of the background expiry sweep (0 disables it)
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_secs() -> u64 {
    120
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_secs > 0).then(|| Duration::from_secs(self.sweep_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// How often a live subscription re-fetches and pushes a snapshot
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    600
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl SubscriptionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecaptchaConfig {
    /// Server-side secret. When unset the gate is bypassed (local/dev mode).
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Minimum score a token needs to pass
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_min_score() -> f64 {
    0.5
}

impl Default for RecaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            verify_url: default_verify_url(),
            min_score: default_min_score(),
        }
    }
}

impl RecaptchaConfig {
    pub fn is_enabled(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            Self::config_path().map_err(|e| ConfigError::MissingSetting(format!("{:#}", e)))?;

        if !config_path.exists() {
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                tracing::warn!("Could not write default config: {:#}", e);
            }
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Invalid(format!("{}: {}", path.display(), e)),
        })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration, apply environment overrides and validate it
    ///
    /// Returns `ConfigError::Invalid` if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_overrides(|name| std::env::var(name).ok());

        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_OPENWEATHER_API_KEY).filter(|v| !v.is_empty()) {
            self.openweather.api_key = key;
        }
        if let Some(secret) = lookup(ENV_RECAPTCHA_SECRET).filter(|v| !v.is_empty()) {
            self.recaptcha.secret = Some(secret);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR).filter(|v| !v.is_empty()) {
            self.server.bind_addr = addr;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            result.add_error(
                "server.bind_addr",
                format!("Not a socket address: {}", self.server.bind_addr),
            );
        }

        if self.openweather.api_key.trim().is_empty() {
            result.add_warning(
                "openweather.api_key",
                format!("No API key configured - set {}", ENV_OPENWEATHER_API_KEY),
            );
        }
        validate_url(&self.openweather.base_url, "openweather.base_url", &mut result);
        if self.openweather.timeout_secs == 0 {
            result.add_error("openweather.timeout_secs", "Timeout must be greater than 0");
        }

        if self.cache.ttl_secs == 0 {
            result.add_error("cache.ttl_secs", "Cache TTL must be greater than 0");
        }
        if self.cache.sweep_secs == 0 {
            result.add_warning("cache.sweep_secs", "Background cache sweep disabled");
        }

        if self.subscriptions.interval_secs == 0 {
            result.add_error(
                "subscriptions.interval_secs",
                "Subscription interval must be greater than 0",
            );
        }

        if self.recaptcha.is_enabled() {
            validate_url(&self.recaptcha.verify_url, "recaptcha.verify_url", &mut result);
        } else {
            result.add_warning(
                "recaptcha.secret",
                "reCAPTCHA not configured - protected endpoints are open",
            );
        }
        if !(0.0..=1.0).contains(&self.recaptcha.min_score) {
            result.add_error("recaptcha.min_score", "Score threshold must be within 0.0..=1.0");
        }

        result
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the default configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skyboard");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
