pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, OpenWeatherConfig, RecaptchaConfig, ServerConfig, SubscriptionConfig,
    ValidationResult,
};
pub use error::{AppError, AuthError, ConfigError, ReqwestErrorExt, WeatherError};

use anyhow::Result;

/// Initialize logging for the gateway process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Skyboard core initialized");
    Ok(())
}
