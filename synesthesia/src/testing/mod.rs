//! Testing utilities for synesthesia pipelines.
//!
//! This module provides:
//! - A scripted inference gateway with call counters and a hold gate
//! - An object URL registry that checks create/revoke balance
//! - Recording surface, capturing output and a fixed decoder for the visualizer

mod mocks;

pub use mocks::{
    CaptureOutput, CountingObjectUrls, RecordedFrame, RecordingSurface, ScriptedGateway,
    StaticDecoder, TINY_PNG_BASE64,
};
