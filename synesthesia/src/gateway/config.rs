//! Configuration for the remote inference gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;

/// Connection and model settings for the gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API key. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for both analysis operations.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    /// Model used for image synthesis.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Aspect ratio requested from the image model.
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_analysis_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_timeout() -> f64 {
    120.0
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            analysis_model: default_analysis_model(),
            image_model: default_image_model(),
            timeout_seconds: default_timeout(),
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

impl GatewayConfig {
    /// Creates a configuration with defaults and no key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the key taken from `API_KEY`, falling back to `GEMINI_API_KEY`.
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .unwrap_or_default();
        Self::default().with_api_key(api_key)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    /// `generateContent` endpoint for a model.
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Checks that the configuration can be used for requests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::new("api_key", "must be set (API_KEY)"));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(ConfigError::new("timeout_seconds", "must be positive"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("analysis_model", &self.analysis_model)
            .field("image_model", &self.image_model)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish()
    }
}
