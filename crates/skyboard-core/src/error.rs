//! Centralized error types for the Skyboard gateway.
//!
//! This module provides a typed error hierarchy that:
//! - Separates caller mistakes from upstream provider failures
//! - Maps every failure to a client-facing status and machine-readable code
//! - Keeps provider detail in logs rather than in responses

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a client-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a message safe to hand back to API clients.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Weather(e) => e.user_message(),
            AppError::Auth(e) => e.user_message().to_string(),
            AppError::Config(e) => e.user_message().to_string(),
            AppError::Io(_) => "A file operation failed.".to_string(),
            AppError::Other(_) => "An unexpected error occurred.".to_string(),
        }
    }
}

/// Failures of a weather lookup, from input validation to the provider call.
#[derive(Debug, Clone, Error)]
pub enum WeatherError {
    /// Malformed or missing input; never reaches the network.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Weather provider timed out")]
    UpstreamTimeout,

    /// Transport failure or non-2xx reply from the provider.
    #[error("Weather provider unavailable: {message}")]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl WeatherError {
    pub fn validation(message: impl Into<String>) -> Self {
        WeatherError::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        WeatherError::UpstreamUnavailable {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the failure originated at the provider rather than the caller.
    pub fn is_upstream(&self) -> bool {
        !matches!(self, WeatherError::Validation(_))
    }

    /// HTTP status used by the REST adapter.
    pub fn http_status(&self) -> u16 {
        match self {
            WeatherError::Validation(_) => 400,
            WeatherError::UpstreamTimeout => 504,
            WeatherError::UpstreamUnavailable { .. } | WeatherError::InvalidResponse(_) => 502,
        }
    }

    /// Machine-readable code carried in GraphQL `extensions.code`.
    pub fn code(&self) -> &'static str {
        match self {
            WeatherError::Validation(_) => "BAD_USER_INPUT",
            WeatherError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            WeatherError::UpstreamUnavailable { .. } | WeatherError::InvalidResponse(_) => {
                "UPSTREAM_UNAVAILABLE"
            }
        }
    }

    /// Client-facing text. Validation messages are echoed, provider detail is not.
    pub fn user_message(&self) -> String {
        match self {
            WeatherError::Validation(msg) => msg.clone(),
            WeatherError::UpstreamTimeout => {
                "Weather service timed out. Please try again.".to_string()
            }
            WeatherError::UpstreamUnavailable { status: Some(401), .. } => {
                "Weather service rejected the API key.".to_string()
            }
            WeatherError::UpstreamUnavailable { .. } => {
                "Weather service unavailable. Please try again later.".to_string()
            }
            WeatherError::InvalidResponse(_) => {
                "Weather service returned unexpected data.".to_string()
            }
        }
    }
}

/// reCAPTCHA gate failures. All of them reject the request.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("reCAPTCHA token missing")]
    MissingToken,

    #[error("reCAPTCHA token rejected: {0}")]
    Rejected(String),

    #[error("reCAPTCHA score {score} below threshold {threshold}")]
    LowScore { score: f64, threshold: f64 },

    #[error("reCAPTCHA verification failed: {0}")]
    VerificationFailed(String),
}

impl AuthError {
    pub fn http_status(&self) -> u16 {
        403
    }

    pub fn code(&self) -> &'static str {
        "FORBIDDEN"
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "reCAPTCHA token is required.",
            AuthError::Rejected(_) => "reCAPTCHA verification was rejected.",
            AuthError::LowScore { .. } => "reCAPTCHA score too low.",
            AuthError::VerificationFailed(_) => "reCAPTCHA verification could not be completed.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_weather_error(self) -> WeatherError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_weather_error(self) -> WeatherError {
        if self.is_timeout() {
            WeatherError::UpstreamTimeout
        } else if self.is_decode() {
            WeatherError::InvalidResponse(self.to_string())
        } else {
            WeatherError::UpstreamUnavailable {
                status: self.status().map(|s| s.as_u16()),
                message: self.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_error_statuses() {
        assert_eq!(WeatherError::validation("lat").http_status(), 400);
        assert_eq!(WeatherError::UpstreamTimeout.http_status(), 504);
        assert_eq!(WeatherError::unavailable("down").http_status(), 502);
        assert_eq!(WeatherError::InvalidResponse("x".into()).http_status(), 502);
    }

    #[test]
    fn test_weather_error_codes() {
        assert_eq!(WeatherError::validation("lat").code(), "BAD_USER_INPUT");
        assert_eq!(WeatherError::UpstreamTimeout.code(), "UPSTREAM_TIMEOUT");
        assert_eq!(
            WeatherError::InvalidResponse("x".into()).code(),
            "UPSTREAM_UNAVAILABLE"
        );
    }

    #[test]
    fn test_upstream_detail_not_in_user_message() {
        let err = WeatherError::UpstreamUnavailable {
            status: Some(500),
            message: "stack trace from provider".into(),
        };
        assert!(err.is_upstream());
        assert!(!err.user_message().contains("stack trace"));
    }

    #[test]
    fn test_validation_message_is_echoed() {
        let err = WeatherError::validation("lat must be between -90 and 90");
        assert!(!err.is_upstream());
        assert_eq!(err.user_message(), "lat must be between -90 and 90");
    }

    #[test]
    fn test_auth_errors_are_forbidden() {
        let errors = [
            AuthError::MissingToken,
            AuthError::Rejected("invalid-input-response".into()),
            AuthError::LowScore { score: 0.3, threshold: 0.5 },
            AuthError::VerificationFailed("timeout".into()),
        ];
        for err in errors {
            assert_eq!(err.http_status(), 403);
            assert_eq!(err.code(), "FORBIDDEN");
            assert!(!err.user_message().is_empty());
        }
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = AuthError::MissingToken.into();
        assert!(matches!(app_err, AppError::Auth(AuthError::MissingToken)));
        assert_eq!(app_err.user_message(), "reCAPTCHA token is required.");
    }

    #[test]
    fn test_config_error_hides_detail() {
        let app_err: AppError = ConfigError::Invalid("cache.ttl_secs: must be > 0".into()).into();
        assert!(app_err.to_string().contains("cache.ttl_secs"));
        assert_eq!(
            app_err.user_message(),
            "Invalid configuration. Check your settings."
        );
    }
}
