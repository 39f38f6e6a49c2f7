//! Scripted collaborators for pipeline and visualizer tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::core::ImageArtifact;
use crate::errors::{DecodeError, GatewayError};
use crate::gateway::{InferenceGateway, RemoteAnalysis};
use crate::input::{InMemoryObjectUrls, LocalAudio, ObjectUrl, ObjectUrlRegistry};
use crate::visualizer::{AudioDecoder, AudioOutput, Bar, DecodedAudio, Rgba, Surface};

/// A 1×1 transparent PNG, base64.
pub const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Gateway returning queued results, in order, per operation.
///
/// When a queue is empty the call succeeds with a fixed default. With
/// [`hold`](Self::hold) every call parks until the returned gate is notified.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    local: Mutex<VecDeque<Result<String, GatewayError>>>,
    remote: Mutex<VecDeque<Result<RemoteAnalysis, GatewayError>>>,
    images: Mutex<VecDeque<Result<ImageArtifact, GatewayError>>>,
    local_calls: AtomicUsize,
    remote_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
    last_mime_type: Mutex<Option<String>>,
    last_reference: Mutex<Option<String>>,
    last_prompt: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedGateway {
    /// Prompt returned when no local result is queued.
    pub const DEFAULT_PROMPT: &'static str = "violet fog drifting over a chrome tide";

    /// Creates a gateway with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next `analyze_local` result.
    #[must_use]
    pub fn with_local(self, result: Result<String, GatewayError>) -> Self {
        self.local.lock().push_back(result);
        self
    }

    /// Queues the next `analyze_remote` result.
    #[must_use]
    pub fn with_remote(self, result: Result<RemoteAnalysis, GatewayError>) -> Self {
        self.remote.lock().push_back(result);
        self
    }

    /// Queues the next `synthesize_image` result.
    #[must_use]
    pub fn with_image(self, result: Result<ImageArtifact, GatewayError>) -> Self {
        self.images.lock().push_back(result);
        self
    }

    /// Makes every later call wait for a notification on the returned gate.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Number of `analyze_local` calls.
    #[must_use]
    pub fn local_calls(&self) -> usize {
        self.local_calls.load(Ordering::SeqCst)
    }

    /// Number of `analyze_remote` calls.
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    /// Number of `synthesize_image` calls.
    #[must_use]
    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }

    /// Total gateway calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.local_calls() + self.remote_calls() + self.synthesize_calls()
    }

    /// Media type of the last local analysis.
    #[must_use]
    pub fn last_mime_type(&self) -> Option<String> {
        self.last_mime_type.lock().clone()
    }

    /// URL of the last remote analysis.
    #[must_use]
    pub fn last_reference(&self) -> Option<String> {
        self.last_reference.lock().clone()
    }

    /// Prompt of the last synthesis.
    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }

    async fn wait_for_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn analyze_local(
        &self,
        _audio_base64: &str,
        mime_type: &str,
    ) -> Result<String, GatewayError> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_mime_type.lock() = Some(mime_type.to_string());
        self.wait_for_gate().await;
        let next = self.local.lock().pop_front();
        next.unwrap_or_else(|| Ok(Self::DEFAULT_PROMPT.to_string()))
    }

    async fn analyze_remote(&self, reference_url: &str) -> Result<RemoteAnalysis, GatewayError> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_reference.lock() = Some(reference_url.to_string());
        self.wait_for_gate().await;
        let next = self.remote.lock().pop_front();
        next.unwrap_or_else(|| Ok(RemoteAnalysis::new(Self::DEFAULT_PROMPT)))
    }

    async fn synthesize_image(&self, prompt: &str) -> Result<ImageArtifact, GatewayError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        self.wait_for_gate().await;
        let next = self.images.lock().pop_front();
        next.unwrap_or_else(|| Ok(ImageArtifact::from_png_base64(TINY_PNG_BASE64)))
    }
}

/// Object URL registry that counts creations and revocations.
#[derive(Debug, Default)]
pub struct CountingObjectUrls {
    inner: InMemoryObjectUrls,
    created: Mutex<Vec<ObjectUrl>>,
    revoked: Mutex<Vec<ObjectUrl>>,
}

impl CountingObjectUrls {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of URLs created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    /// Number of revocations, duplicates included.
    #[must_use]
    pub fn revoked(&self) -> usize {
        self.revoked.lock().len()
    }

    /// URLs still live.
    #[must_use]
    pub fn live(&self) -> usize {
        self.inner.live_count()
    }

    /// Returns true if every created URL was revoked exactly once.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        let created = self.created.lock();
        let revoked = self.revoked.lock();
        created.len() == revoked.len()
            && created
                .iter()
                .all(|url| revoked.iter().filter(|r| *r == url).count() == 1)
    }
}

impl ObjectUrlRegistry for CountingObjectUrls {
    fn create(&self, audio: &LocalAudio) -> ObjectUrl {
        let url = self.inner.create(audio);
        self.created.lock().push(url.clone());
        url
    }

    fn revoke(&self, url: &ObjectUrl) {
        self.revoked.lock().push(url.clone());
        self.inner.revoke(url);
    }
}

/// One frame captured by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Colour the frame was cleared with.
    pub background: Rgba,
    /// Bars drawn after the clear, in order.
    pub bars: Vec<Bar>,
}

#[derive(Debug, Default)]
struct Recording {
    frames: VecDeque<RecordedFrame>,
    total: usize,
}

/// Surface that records clears and bars instead of rasterizing.
///
/// Clones share the same recording. Only the latest frames are retained.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingSurface {
    const RETAINED: usize = 32;

    /// Creates an empty recording surface.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Frames started so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.recording.lock().total
    }

    /// The most recent frame.
    #[must_use]
    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.recording.lock().frames.back().cloned()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        let mut recording = self.recording.lock();
        if recording.frames.len() == Self::RETAINED {
            recording.frames.pop_front();
        }
        recording.frames.push_back(RecordedFrame {
            background: color,
            bars: Vec::new(),
        });
        recording.total += 1;
    }

    fn fill_bar(&mut self, bar: &Bar) {
        if let Some(frame) = self.recording.lock().frames.back_mut() {
            frame.bars.push(*bar);
        }
    }
}

/// Output that keeps every sample written to it.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: Arc<Mutex<Option<u32>>>,
}

impl CaptureOutput {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn samples(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    /// Sample rate of the last write.
    #[must_use]
    pub fn sample_rate(&self) -> Option<u32> {
        *self.sample_rate.lock()
    }
}

impl AudioOutput for CaptureOutput {
    fn write(&self, sample_rate: u32, samples: &[f32]) {
        *self.sample_rate.lock() = Some(sample_rate);
        self.samples.lock().extend_from_slice(samples);
    }
}

/// Decoder returning the same audio for any input.
#[derive(Debug, Clone)]
pub struct StaticDecoder {
    audio: DecodedAudio,
    calls: Arc<AtomicUsize>,
}

impl StaticDecoder {
    /// Always decodes to `audio`.
    #[must_use]
    pub fn new(audio: DecodedAudio) -> Self {
        Self {
            audio,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A sine tone at `frequency` Hz.
    #[must_use]
    pub fn tone(sample_rate: u32, frequency: f32, seconds: f32) -> Self {
        let len = (sample_rate as f32 * seconds) as usize;
        let samples = (0..len)
            .map(|n| 0.5 * (2.0 * PI * frequency * n as f32 / sample_rate as f32).sin())
            .collect();
        Self::new(DecodedAudio::new(sample_rate, samples))
    }

    /// Silence.
    #[must_use]
    pub fn silence(sample_rate: u32, seconds: f32) -> Self {
        let len = (sample_rate as f32 * seconds) as usize;
        Self::new(DecodedAudio::new(sample_rate, vec![0.0; len]))
    }

    /// Number of decode calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AudioDecoder for StaticDecoder {
    fn decode(&self, _bytes: &[u8], _mime_type: &str) -> Result<DecodedAudio, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.audio.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_gateway_queue_then_default() {
        let gateway = ScriptedGateway::new().with_local(Err(GatewayError::analysis("quota")));
        assert_eq!(
            gateway.analyze_local("AAAA", "audio/mpeg").await,
            Err(GatewayError::analysis("quota"))
        );
        assert_eq!(
            gateway.analyze_local("AAAA", "audio/mpeg").await.unwrap(),
            ScriptedGateway::DEFAULT_PROMPT
        );
        assert_eq!(gateway.local_calls(), 2);
        assert_eq!(gateway.last_mime_type().as_deref(), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn test_scripted_gateway_hold() {
        let gateway = ScriptedGateway::new();
        let gate = gateway.hold();
        let mut call = tokio_test::task::spawn(gateway.synthesize_image("p"));
        tokio_test::assert_pending!(call.poll());
        gate.notify_one();
        assert!(call.is_woken());
        let image = tokio_test::assert_ready!(call.poll()).unwrap();
        assert!(image.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_counting_urls_balance() {
        let urls = CountingObjectUrls::new();
        let audio = LocalAudio::new("a.mp3", "audio/mpeg", vec![1_u8]);
        let url = urls.create(&audio);
        assert!(!urls.is_balanced());
        urls.revoke(&url);
        assert!(urls.is_balanced());
        urls.revoke(&url);
        assert!(!urls.is_balanced());
    }

    #[test]
    fn test_recording_surface_retains_latest() {
        let mut surface = RecordingSurface::new(10, 10);
        for _ in 0..40 {
            surface.clear(Rgba::BLACK);
        }
        assert_eq!(surface.frame_count(), 40);
        assert_eq!(surface.recording.lock().frames.len(), RecordingSurface::RETAINED);
    }
}
