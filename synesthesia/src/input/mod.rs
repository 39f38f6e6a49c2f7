//! Media input resolution.
//!
//! User input arrives either as a local audio binary or as a remote content
//! reference. This module validates both and normalizes them into an
//! [`InputSelection`]; the pipeline decides what the selection supersedes.

mod object_url;

pub use object_url::{InMemoryObjectUrls, ObjectUrl, ObjectUrlRegistry, PlaybackResource};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::errors::Result;
use crate::pipeline::Rejection;

/// Which kind of input the user is providing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// A local audio binary.
    #[default]
    Local,
    /// A remote content reference.
    Remote,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A local audio binary with its declared media type.
#[derive(Clone)]
pub struct LocalAudio {
    bytes: Arc<[u8]>,
    mime_type: String,
    display_name: String,
}

impl LocalAudio {
    /// Creates a new local audio object.
    pub fn new(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            display_name: display_name.into(),
        }
    }

    /// Reads a file, inferring the media type from its extension.
    ///
    /// Unknown extensions get `application/octet-stream`, which the resolver
    /// rejects.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension)
            .unwrap_or("application/octet-stream");
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(display_name, mime_type, bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Declared media type.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File name shown to the user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns true if the declared media type is an audio kind.
    #[must_use]
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    /// Base64 payload for the analyze call.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl fmt::Debug for LocalAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAudio")
            .field("display_name", &self.display_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// The normalized input handed to the analyze step.
#[derive(Debug, Clone)]
pub enum InputSelection {
    /// A bound local binary.
    Local(LocalAudio),
    /// A remote reference URL.
    Remote(String),
}

impl InputSelection {
    /// The mode this selection belongs to.
    #[must_use]
    pub fn mode(&self) -> InputMode {
        match self {
            Self::Local(_) => InputMode::Local,
            Self::Remote(_) => InputMode::Remote,
        }
    }
}

/// Accepts a local binary only if it declares an audio media type.
pub fn resolve_local(audio: LocalAudio) -> Result<LocalAudio, Rejection> {
    if audio.is_audio() {
        Ok(audio)
    } else {
        Err(Rejection::NotAudio {
            mime_type: audio.mime_type.clone(),
        })
    }
}

/// Accepts a remote reference for dispatch if it is not blank.
///
/// No format validation happens here; the gateway is the source of truth.
pub fn resolve_remote(url: &str) -> Result<InputSelection, Rejection> {
    if url.trim().is_empty() {
        Err(Rejection::NoInput)
    } else {
        Ok(InputSelection::Remote(url.to_string()))
    }
}

/// Status message shown after a local file is loaded.
#[must_use]
pub fn loaded_message(audio: &LocalAudio) -> String {
    format!("FILE_LOADED: {}", audio.display_name().to_uppercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "webm" => "audio/webm",
        _ => return None,
    };
    Some(mime)
}
