//! Gateway backed by the Generative Language REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::{GatewayConfig, InferenceGateway, RemoteAnalysis};
use crate::core::{Citation, ImageArtifact};
use crate::errors::{ConfigError, GatewayError, Result};
use crate::observability::SpanTimer;

const LOCAL_ANALYSIS_INSTRUCTIONS: &str = "Act as a world-class art director and synesthete. \
Analyze this audio file and describe its atmosphere, rhythm, and energy in an artistic visual prompt. \
The prompt must be in ENGLISH, describing an abstract or surreal scene. \
Provide ONLY the final prompt of approximately 60 words.";

const NO_IMAGE_MESSAGE: &str = "Unable to generate image.";

const USER_AGENT: &str = concat!("synesthesia/", env!("CARGO_PKG_VERSION"));

fn remote_analysis_instructions(url: &str) -> String {
    format!(
        "Find information about this YouTube video: {url}. \
Analyze the musical genre, lyrics, mood, and visual aesthetics of the music video if present. \
Act as a synesthete and create an artistic prompt in ENGLISH (max 60 words) that visually represents this specific song. \
Describe textures, colors, and lighting. Output ONLY the prompt."
    )
}

/// [`InferenceGateway`] speaking to `models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GeminiGateway {
    /// Creates a gateway, validating the configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::new("http_client", e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Creates a gateway from `API_KEY` / `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn generate(
        &self,
        model: &str,
        body: serde_json::Value,
        fail: fn(String) -> GatewayError,
    ) -> Result<GenerateResponse, GatewayError> {
        let timer = SpanTimer::start(model);
        let response = self
            .client
            .post(self.config.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(format!("Network error: {e}")))?;

        let status = response.status();
        let duration_ms = timer.finish();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = http_failure_message(status, &body);
            error!(model, status = status.as_u16(), duration_ms, %message, "Gateway call failed");
            return Err(fail(message));
        }

        debug!(model, duration_ms, "Gateway call completed");
        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| fail(format!("Parse error: {e}")))
    }
}

#[async_trait]
impl InferenceGateway for GeminiGateway {
    async fn analyze_local(
        &self,
        audio_base64: &str,
        mime_type: &str,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": audio_base64 } },
                    { "text": LOCAL_ANALYSIS_INSTRUCTIONS }
                ]
            }]
        });
        let response = self
            .generate(&self.config.analysis_model, body, |message| GatewayError::Analysis { message })
            .await?;
        Ok(response.text())
    }

    async fn analyze_remote(&self, reference_url: &str) -> Result<RemoteAnalysis, GatewayError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": remote_analysis_instructions(reference_url) }] }],
            "tools": [{ "googleSearch": {} }]
        });
        let response = self
            .generate(&self.config.analysis_model, body, |message| GatewayError::Analysis { message })
            .await?;
        Ok(RemoteAnalysis {
            prompt: response.text(),
            sources: response.citations(),
        })
    }

    async fn synthesize_image(&self, prompt: &str) -> Result<ImageArtifact, GatewayError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "imageConfig": { "aspectRatio": self.config.aspect_ratio }
            }
        });
        let response = self
            .generate(&self.config.image_model, body, |message| GatewayError::Synthesis { message })
            .await?;
        response
            .first_image()
            .ok_or_else(|| GatewayError::synthesis(NO_IMAGE_MESSAGE))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text parts of the first candidate, trimmed.
    fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Web grounding chunks as citations; chunks without a URI are skipped.
    fn citations(&self) -> Vec<Citation> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| {
                m.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        let uri = web.uri.clone()?;
                        let title = web
                            .title
                            .clone()
                            .filter(|t| !t.is_empty())
                            .unwrap_or_else(|| "LINK".to_string());
                        Some(Citation { title, uri })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn first_image(&self) -> Option<ImageArtifact> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| ImageArtifact::from_png_base64(&d.data))
    }
}

/// Message for a non-success response.
fn http_failure_message(status: StatusCode, body: &str) -> String {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return "Invalid API key".to_string();
    }
    let detail = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("API error {}", status.as_u16())
    } else {
        format!("API error {}: {detail}", status.as_u16())
    }
}

fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(String::from)
}
