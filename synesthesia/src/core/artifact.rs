//! Derived artifacts: the prompt, its citations and the final image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{DataUriError, Result};

/// A source cited by remote analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Display title.
    pub title: String,
    /// Link target.
    pub uri: String,
}

impl Citation {
    /// Creates a new citation.
    #[must_use]
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// A generated image held as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageArtifact {
    data_uri: String,
}

impl ImageArtifact {
    /// Wraps a base64 PNG payload as `data:image/png;base64,<payload>`.
    #[must_use]
    pub fn from_png_base64(payload: &str) -> Self {
        Self {
            data_uri: format!("data:image/png;base64,{payload}"),
        }
    }

    /// Parses an existing data URI, checking that it is base64 encoded.
    pub fn from_data_uri(data_uri: impl Into<String>) -> Result<Self, DataUriError> {
        let data_uri = data_uri.into();
        let (header, _) = split_data_uri(&data_uri)?;
        if !header.ends_with(";base64") {
            return Err(DataUriError::NotBase64);
        }
        Ok(Self { data_uri })
    }

    /// The full data URI.
    #[must_use]
    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    /// Media type declared by the URI, e.g. `image/png`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        split_data_uri(&self.data_uri)
            .map(|(header, _)| header.trim_end_matches(";base64"))
            .unwrap_or_default()
    }

    /// Decodes the base64 payload.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, DataUriError> {
        let (_, payload) = split_data_uri(&self.data_uri)?;
        STANDARD
            .decode(payload)
            .map_err(|e| DataUriError::InvalidPayload(e.to_string()))
    }

    /// Download filename incorporating the timestamp.
    #[must_use]
    pub fn download_filename(at: DateTime<Utc>) -> String {
        format!("synth_art_{}.png", at.timestamp_millis())
    }

    /// Decodes the image and writes it to `dir` under a timestamped name.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let bytes = self.decode_bytes()?;
        let path = dir.as_ref().join(Self::download_filename(Utc::now()));
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), "Saved generated image");
        Ok(path)
    }
}

fn split_data_uri(uri: &str) -> Result<(&str, &str), DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::MissingScheme)?;
    rest.split_once(',').ok_or(DataUriError::NotBase64)
}

/// The mutable in-progress output of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedArtifact {
    /// Prompt text from analysis, editable while dreaming.
    pub prompt: String,
    /// Citations from remote analysis, in returned order.
    pub sources: Vec<Citation>,
    /// Final image, set only by a successful synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageArtifact>,
}

impl DerivedArtifact {
    /// Returns true if nothing has been derived yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompt.is_empty() && self.sources.is_empty() && self.image.is_none()
    }

    /// Drops every derived value.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
