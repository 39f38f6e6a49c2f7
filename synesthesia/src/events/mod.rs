//! Event sink system for observability.
//!
//! The pipeline and visualizer report every transition and resource event
//! through an [`EventSink`]; the default sink discards them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event emitted on every stage change.
pub const STAGE_CHANGED: &str = "pipeline.stage_changed";
/// Event emitted when an in-flight result is discarded.
pub const RESULT_ABSORBED: &str = "pipeline.absorbed";
/// Event emitted when an input is accepted.
pub const INPUT_SELECTED: &str = "input.selected";
/// Event emitted when an input is rejected by a guard.
pub const INPUT_REJECTED: &str = "input.rejected";
/// Event emitted when an object URL is released.
pub const RESOURCE_RELEASED: &str = "resource.released";
/// Event emitted when a visualizer session starts.
pub const VISUALIZER_STARTED: &str = "visualizer.started";
/// Event emitted when a visualizer session ends.
pub const VISUALIZER_STOPPED: &str = "visualizer.stopped";
/// Event emitted when the visualizer cannot decode its source.
pub const VISUALIZER_DECODE_FAILED: &str = "visualizer.decode_failed";
