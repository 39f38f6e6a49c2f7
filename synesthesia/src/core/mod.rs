//! Core domain model types.
//!
//! This module contains the values every other module passes around:
//! - Pipeline stages and the processing status surface
//! - Derived artifacts (prompt, citations, image)

mod artifact;
mod status;

pub use artifact::{Citation, DerivedArtifact, ImageArtifact};
pub use status::{
    ProcessingStatus, Stage, MSG_ANALYSIS_FAILED, MSG_ANALYZING, MSG_COMPLETED, MSG_DREAMING,
    MSG_PAINTING, MSG_READY, MSG_RENDERING_FAILED, MSG_URL_LINKED,
};
