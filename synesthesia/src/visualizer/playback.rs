//! Playback cursor, output gain and the audio output seam.

use std::sync::Arc;

/// Fixed amplitude scaling applied before samples reach the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    gain: f32,
}

impl GainStage {
    /// Creates a gain stage.
    #[must_use]
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// The gain factor.
    #[must_use]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Scales `samples` into `out`, reusing its allocation.
    pub fn apply_into(&self, samples: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend(samples.iter().map(|s| s * self.gain));
    }
}

/// Sink for gained playback samples.
pub trait AudioOutput: Send + Sync {
    /// Receives one frame's worth of mono samples.
    fn write(&self, sample_rate: u32, samples: &[f32]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn write(&self, _sample_rate: u32, _samples: &[f32]) {}
}

/// Walks decoded samples one frame at a time.
///
/// Once the source is exhausted every frame is silence, so the render loop
/// can keep running at a constant rate.
#[derive(Debug)]
pub struct PlaybackCursor {
    samples: Arc<[f32]>,
    position: usize,
    per_frame: usize,
    frame: Vec<f32>,
}

impl PlaybackCursor {
    /// Creates a cursor advancing `sample_rate / frame_rate` samples per frame.
    #[must_use]
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, frame_rate: u32) -> Self {
        let per_frame = (sample_rate / frame_rate.max(1)).max(1) as usize;
        Self {
            samples: samples.into(),
            position: 0,
            per_frame,
            frame: vec![0.0; per_frame],
        }
    }

    /// Samples consumed per frame.
    #[must_use]
    pub fn samples_per_frame(&self) -> usize {
        self.per_frame
    }

    /// Returns true once every source sample has been played.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }

    /// Advances by one frame and returns its samples.
    pub fn next_frame(&mut self) -> &[f32] {
        let start = self.position.min(self.samples.len());
        let end = (start + self.per_frame).min(self.samples.len());
        let available = end - start;
        self.frame[..available].copy_from_slice(&self.samples[start..end]);
        self.frame[available..].fill(0.0);
        self.position = self.position.saturating_add(self.per_frame);
        &self.frame
    }
}
