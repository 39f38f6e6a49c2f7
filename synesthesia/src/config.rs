//! Top-level configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::Result;
use crate::gateway::GatewayConfig;
use crate::observability::LogFormat;
use crate::visualizer::VisualizerConfig;

/// Everything needed to assemble a pipeline and its visualizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    /// Remote inference settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Analysis and rendering settings.
    #[serde(default)]
    pub visualizer: VisualizerConfig,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl StudioConfig {
    /// Defaults, with the API key read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            gateway: GatewayConfig::from_env(),
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing sections and fields take defaults.
    ///
    /// If the document leaves the API key unset, the environment is consulted.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        if config.gateway.api_key.is_empty() {
            config.gateway.api_key = GatewayConfig::from_env().api_key;
        }
        config.visualizer.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
