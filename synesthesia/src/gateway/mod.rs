//! Remote inference gateway.
//!
//! The pipeline only relies on the contract below: three async operations
//! that either answer or fail with a [`GatewayError`]. How the remote model
//! produces its output is out of scope.

mod config;
#[cfg(feature = "gemini")]
mod gemini;

pub use config::GatewayConfig;
#[cfg(feature = "gemini")]
pub use gemini::GeminiGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Citation, ImageArtifact};
use crate::errors::GatewayError;

/// Result of analysing a remote reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAnalysis {
    /// Synthesized visual prompt.
    pub prompt: String,
    /// Citations grounding the prompt, in returned order.
    #[serde(default)]
    pub sources: Vec<Citation>,
}

impl RemoteAnalysis {
    /// Creates a remote analysis without citations.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sources: Vec::new(),
        }
    }

    /// Adds a citation.
    #[must_use]
    pub fn with_source(mut self, title: impl Into<String>, uri: impl Into<String>) -> Self {
        self.sources.push(Citation::new(title, uri));
        self
    }
}

/// The three remote operations the pipeline consumes.
///
/// Calls may take seconds; implementations must not block the executor.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Turns a base64 audio payload into a visual prompt.
    async fn analyze_local(
        &self,
        audio_base64: &str,
        mime_type: &str,
    ) -> Result<String, GatewayError>;

    /// Turns a remote content reference into a prompt plus citations.
    async fn analyze_remote(&self, reference_url: &str) -> Result<RemoteAnalysis, GatewayError>;

    /// Paints the prompt. Failing to return an image is a `Synthesis` error.
    async fn synthesize_image(&self, prompt: &str) -> Result<ImageArtifact, GatewayError>;
}
