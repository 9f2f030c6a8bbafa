//! reCAPTCHA v3 verification and the axum middleware that enforces it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use skyboard_core::{AuthError, RecaptchaConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::rest::ApiError;
use crate::AppState;

/// Header carrying the client's reCAPTCHA token
pub const TOKEN_HEADER: &str = "x-recaptcha-token";

/// Outcome of one siteverify round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub score: Option<f64>,
    pub reason: Option<String>,
}

impl Verification {
    fn passed(score: f64) -> Self {
        Self {
            valid: true,
            score: Some(score),
            reason: None,
        }
    }

    fn rejected(err: &AuthError) -> Self {
        let score = match err {
            AuthError::LowScore { score, .. } => Some(*score),
            _ => None,
        };
        Self {
            valid: false,
            score,
            reason: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[derive(Debug)]
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
    min_score: f64,
    bypass_warned: AtomicBool,
}

impl RecaptchaVerifier {
    pub fn new(config: &RecaptchaConfig, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

        Ok(Self {
            client,
            secret: config
                .secret
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            verify_url: config.verify_url.clone(),
            min_score: config.min_score,
            bypass_warned: AtomicBool::new(false),
        })
    }

    /// A verifier with no secret; every check is bypassed.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            secret: None,
            verify_url: String::new(),
            min_score: 0.0,
            bypass_warned: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a token against the siteverify endpoint. Any failure rejects.
    pub async fn verify(&self, token: &str) -> Verification {
        match self.evaluate(token).await {
            Ok(verification) => verification,
            Err(e) => Verification::rejected(&e),
        }
    }

    /// Gate check for a request. `Ok(None)` means the gate is bypassed.
    pub async fn check(&self, token: Option<&str>) -> Result<Option<Verification>, AuthError> {
        if !self.is_enabled() {
            if !self.bypass_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!("No reCAPTCHA secret configured, verification is bypassed");
            }
            return Ok(None);
        }

        let token = token.ok_or(AuthError::MissingToken)?;
        self.evaluate(token).await.map(Some)
    }

    async fn evaluate(&self, token: &str) -> Result<Verification, AuthError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::VerificationFailed("no secret configured".to_string()))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::VerificationFailed(format!("HTTP {}", status)));
        }

        let body: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

        if !body.success {
            return Err(AuthError::Rejected(body.error_codes.join(", ")));
        }

        // v2 tokens carry no score and never pass a scored gate
        let score = body.score.unwrap_or(0.0);
        if score < self.min_score {
            return Err(AuthError::LowScore {
                score,
                threshold: self.min_score,
            });
        }

        tracing::debug!("reCAPTCHA passed with score {}", score);
        Ok(Verification::passed(score))
    }
}

/// Middleware rejecting requests without a passing `x-recaptcha-token`.
pub async fn require_recaptcha(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.recaptcha.check(token.as_deref()).await {
        Ok(_) => next.run(request).await,
        Err(e) => {
            tracing::warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            ApiError::from(e).into_response()
        }
    }
}
