//! Pipeline stages and the user-facing processing status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status message shown when nothing is loaded.
pub const MSG_READY: &str = "READY_TO_START";
/// Status message while the analyze call is in flight.
pub const MSG_ANALYZING: &str = "EXTRACTING_SONIC_DNA";
/// Status message once a prompt is available.
pub const MSG_DREAMING: &str = "PROMPT_SYNTHESIZED";
/// Status message while the synthesize call is in flight.
pub const MSG_PAINTING: &str = "IMAGEN_RENDERING";
/// Status message once an image is available.
pub const MSG_COMPLETED: &str = "PROCESS_COMPLETE";
/// Status message after an analyze failure.
pub const MSG_ANALYSIS_FAILED: &str = "ANALYSIS_FAILED";
/// Status message after a synthesize failure.
pub const MSG_RENDERING_FAILED: &str = "RENDERING_FAILURE";
/// Status message after a remote reference is linked.
pub const MSG_URL_LINKED: &str = "URL_LINKED";

/// A named phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Waiting for input or a start trigger.
    #[default]
    Idle,
    /// Analyze call in flight.
    Analyzing,
    /// Prompt available for editing.
    Dreaming,
    /// Synthesize call in flight.
    Painting,
    /// Image available.
    Completed,
    /// A gateway call failed. Terminal until reset.
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Analyzing => write!(f, "ANALYZING"),
            Self::Dreaming => write!(f, "DREAMING"),
            Self::Painting => write!(f, "PAINTING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl Stage {
    /// Fixed progress hint for the stage.
    ///
    /// These are presentation values, not measured completion.
    #[must_use]
    pub const fn progress(self) -> u8 {
        match self {
            Self::Idle | Self::Error => 0,
            Self::Analyzing => 30,
            Self::Painting => 85,
            Self::Dreaming | Self::Completed => 100,
        }
    }

    /// Returns true while a gateway call is outstanding.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Analyzing | Self::Painting)
    }

    /// Returns true if `start_analysis` may fire from this stage.
    #[must_use]
    pub const fn accepts_analysis(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

/// The state surface consumed by the presentation layer.
///
/// Fields are private so that `stage == Error` holds exactly when an error
/// message is present; build values through the per-stage constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingStatus {
    stage: Stage,
    progress: u8,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::ready()
    }
}

impl ProcessingStatus {
    fn at(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: stage.progress(),
            message: message.into(),
            error: None,
        }
    }

    /// Initial status with nothing loaded.
    #[must_use]
    pub fn ready() -> Self {
        Self::at(Stage::Idle, MSG_READY)
    }

    /// Idle with a custom message (e.g. after loading a file).
    #[must_use]
    pub fn idle(message: impl Into<String>) -> Self {
        Self::at(Stage::Idle, message)
    }

    /// Analyze call in flight.
    #[must_use]
    pub fn analyzing() -> Self {
        Self::at(Stage::Analyzing, MSG_ANALYZING)
    }

    /// Prompt available.
    #[must_use]
    pub fn dreaming() -> Self {
        Self::at(Stage::Dreaming, MSG_DREAMING)
    }

    /// Synthesize call in flight.
    #[must_use]
    pub fn painting() -> Self {
        Self::at(Stage::Painting, MSG_PAINTING)
    }

    /// Image available.
    #[must_use]
    pub fn completed() -> Self {
        Self::at(Stage::Completed, MSG_COMPLETED)
    }

    /// Failure with a status message and the verbatim error text.
    #[must_use]
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::at(Stage::Error, message)
        }
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Progress hint, 0–100.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Short uppercase status message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Error text, present only in the `Error` stage.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true if the status is the pristine ready state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self == Self::ready()
    }
}
