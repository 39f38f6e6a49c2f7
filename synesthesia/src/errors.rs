//! Error types for the synesthesia pipeline.
//!
//! Gateway failures are split the way the pipeline reacts to them: analysis and
//! synthesis failures surface to the user, cancellation is filtered out before
//! it ever reaches the status surface.

use thiserror::Error;

/// The main error type for fallible synesthesia operations.
#[derive(Debug, Error)]
pub enum SynesthesiaError {
    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A remote inference call failed.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// Audio decoding failed.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// A data URI could not be parsed.
    #[error("{0}")]
    DataUri(#[from] DataUriError),

    /// Image encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a remote inference call.
///
/// The display form of `Analysis` and `Synthesis` is the bare message, which
/// the pipeline surfaces verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The remote analyze call failed.
    #[error("{message}")]
    Analysis {
        /// Human-readable failure message.
        message: String,
    },

    /// The remote synthesize call failed or returned no image.
    #[error("{message}")]
    Synthesis {
        /// Human-readable failure message.
        message: String,
    },

    /// The call was aborted by user action. Never surfaced.
    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Creates an analysis error.
    #[must_use]
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis {
            message: message.into(),
        }
    }

    /// Creates a synthesis error.
    #[must_use]
    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis {
            message: message.into(),
        }
    }

    /// Returns true for a user-initiated cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Error raised when decoding an audio binary into samples fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The media type is not handled by the decoder.
    #[error("Unsupported audio format: {mime_type}")]
    Unsupported {
        /// The rejected media type.
        mime_type: String,
    },

    /// The binary is not valid audio of its declared type.
    #[error("Malformed audio: {0}")]
    Malformed(String),

    /// The binary decoded to zero samples.
    #[error("Audio contains no samples")]
    Empty,
}

/// Error raised for invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration for '{field}': {reason}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when an image data URI is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataUriError {
    /// The string does not start with `data:`.
    #[error("Not a data URI")]
    MissingScheme,

    /// The URI is not base64 encoded.
    #[error("Data URI is not base64 encoded")]
    NotBase64,

    /// The payload is not valid base64.
    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(String),
}

/// Result alias for synesthesia operations.
pub type Result<T, E = SynesthesiaError> = std::result::Result<T, E>;
