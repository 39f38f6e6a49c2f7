//! # Synesthesia
//!
//! Turns a piece of music into a picture.
//!
//! A track (a local audio file or a reference to a video online) is sent to a
//! remote model that describes it as a visual prompt. The prompt can be edited
//! and is then rendered into an image. While a local file is loaded, a live
//! frequency-bar visualization plays alongside.
//!
//! - **Pipeline state machine**: guarded transitions through
//!   `IDLE → ANALYZING → DREAMING → PAINTING → COMPLETED`, with `ERROR` and reset
//! - **Cancellation**: late gateway results after a reset or new selection are absorbed
//! - **Resource ownership**: object URLs for local audio are released exactly once
//! - **Visualization**: analyser-node style byte frequency data rendered as bars
//! - **Event-driven observability**: every transition reported through an [`events::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synesthesia::prelude::*;
//!
//! let gateway = Arc::new(GeminiGateway::from_env()?);
//! let config = VisualizerConfig::default();
//! let visualizer = Arc::new(AudioVisualizer::new(config.clone(), config.raster_surface())?);
//! let pipeline = SynesthesiaPipeline::new(gateway).with_visualizer(visualizer);
//!
//! pipeline.select_local(LocalAudio::from_path("track.wav")?);
//! pipeline.start_analysis().await;
//! pipeline.edit_prompt("liquid chrome waves under a violet sun");
//! pipeline.synthesize().await;
//!
//! if let Some(image) = pipeline.image() {
//!     image.save_to(".")?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod input;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod visualizer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::StudioConfig;
    pub use crate::core::{Citation, DerivedArtifact, ImageArtifact, ProcessingStatus, Stage};
    pub use crate::errors::{GatewayError, SynesthesiaError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "gemini")]
    pub use crate::gateway::GeminiGateway;
    pub use crate::gateway::{GatewayConfig, InferenceGateway, RemoteAnalysis};
    pub use crate::input::{InputMode, LocalAudio};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{Rejection, SynesthesiaPipeline, Transition};
    pub use crate::visualizer::{
        AudioVisualizer, RasterSurface, Surface, VisualizerConfig, VisualizerState,
    };
}
