//! Outcomes of pipeline operations.

use serde::Serialize;
use thiserror::Error;

use crate::core::Stage;

/// Why a request was not applied.
///
/// Rejections are ordinary outcomes of the guards, not failures: the state is
/// left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// The selected binary does not declare an audio media type.
    #[error("not an audio file: {mime_type}")]
    NotAudio {
        /// The declared media type.
        mime_type: String,
    },

    /// Nothing is bound to analyse.
    #[error("no input selected")]
    NoInput,

    /// The current stage does not accept the request.
    #[error("busy in stage {stage}")]
    Busy {
        /// The stage that refused.
        stage: Stage,
    },

    /// The prompt is blank.
    #[error("prompt is empty")]
    EmptyPrompt,

    /// The prompt can only be edited while dreaming.
    #[error("prompt is not editable in stage {stage}")]
    NotEditable {
        /// The stage that refused.
        stage: Stage,
    },

    /// The request would not change anything.
    #[error("nothing to change")]
    Unchanged,
}

/// What a pipeline operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Transition {
    /// State changed; the pipeline is now in this stage.
    Applied(Stage),
    /// A guard refused the request.
    Ignored(Rejection),
    /// An in-flight result arrived after being cancelled or superseded and was
    /// discarded.
    Absorbed,
}

impl Transition {
    /// Returns true if the operation changed state.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The resulting stage, if applied.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Applied(stage) => Some(*stage),
            _ => None,
        }
    }

    /// The rejection, if ignored.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Ignored(rejection) => Some(rejection),
            _ => None,
        }
    }
}
