//! Live audio visualization.
//!
//! While a local binary is bound, an [`AudioVisualizer`] session decodes it,
//! plays it through a low-gain output and renders one frame of frequency bars
//! per tick. A session keeps rendering after the audio ends (silent frames)
//! until it is stopped or replaced by a new one.
//!
//! The session lifecycle is independent of the pipeline stage: analysis and
//! synthesis never interrupt rendering.

mod analyser;
mod config;
mod decode;
mod playback;
mod render;

pub use analyser::{blackman_window, FrequencyAnalyser};
pub use config::VisualizerConfig;
pub use decode::{AudioDecoder, DecodedAudio, SymphoniaDecoder, WavDecoder};
pub use playback::{AudioOutput, GainStage, NullOutput, PlaybackCursor};
pub use render::{draw_frame, layout_bars, Bar, RasterSurface, Rgba, Surface};

#[cfg(test)]
pub(crate) use decode::tests::{wav_bytes, SQUARE_FLAC};
#[cfg(test)]
pub use decode::MockAudioDecoder;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cancellation::{CancellationToken, DropGuard};
use crate::errors::ConfigError;
use crate::events::{
    EventSink, NoOpEventSink, VISUALIZER_DECODE_FAILED, VISUALIZER_STARTED, VISUALIZER_STOPPED,
};
use crate::input::LocalAudio;

/// Whether a session is rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizerState {
    /// No session, or the last one ended.
    #[default]
    Stopped,
    /// A session is rendering frames.
    Running,
}

type SharedSurface = Arc<Mutex<Box<dyn Surface>>>;

#[derive(Debug, Default)]
struct Shared {
    session_id: u64,
    state: VisualizerState,
    frames: u64,
}

impl Shared {
    /// Counts a frame for `id`. Returns false once `id` is no longer current.
    fn record_frame(&mut self, id: u64) -> bool {
        if self.session_id == id && self.state == VisualizerState::Running {
            self.frames += 1;
            true
        } else {
            false
        }
    }

    /// Marks `id` stopped. Returns true if this call ended it.
    fn finish(&mut self, id: u64) -> bool {
        if self.session_id == id && self.state == VisualizerState::Running {
            self.state = VisualizerState::Stopped;
            true
        } else {
            false
        }
    }
}

struct Session {
    id: u64,
    token: Arc<CancellationToken>,
    handle: JoinHandle<()>,
}

/// Drives at most one render session at a time.
pub struct AudioVisualizer {
    config: VisualizerConfig,
    decoder: Arc<dyn AudioDecoder>,
    output: Arc<dyn AudioOutput>,
    surface: SharedSurface,
    events: Arc<dyn EventSink>,
    shared: Arc<Mutex<Shared>>,
    session: Mutex<Option<Session>>,
}

impl AudioVisualizer {
    /// Creates a stopped visualizer drawing onto `surface`.
    pub fn new(
        config: VisualizerConfig,
        surface: impl Surface + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            decoder: Arc::new(SymphoniaDecoder),
            output: Arc::new(NullOutput),
            surface: Arc::new(Mutex::new(Box::new(surface))),
            events: Arc::new(NoOpEventSink),
            shared: Arc::new(Mutex::new(Shared::default())),
            session: Mutex::new(None),
        })
    }

    /// Replaces the decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replaces the audio output.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = output;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> VisualizerState {
        self.shared.lock().state
    }

    /// Returns true while a session is rendering.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == VisualizerState::Running
    }

    /// Frames drawn by the current (or last) session.
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.shared.lock().frames
    }

    /// Starts a session for `audio`, stopping any previous one first.
    ///
    /// Returns the new session id, or `None` outside a Tokio runtime.
    pub fn start(&self, audio: &LocalAudio) -> Option<u64> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(name = audio.display_name(), "No runtime; visualizer not started");
                return None;
            }
        };

        let mut slot = self.session.lock();
        if let Some(previous) = slot.take() {
            self.end(previous);
        }

        let id = {
            let mut shared = self.shared.lock();
            shared.session_id += 1;
            shared.state = VisualizerState::Running;
            shared.frames = 0;
            shared.session_id
        };
        let token = Arc::new(CancellationToken::new());

        info!(session = id, name = audio.display_name(), "Visualizer started");
        self.events.try_emit(
            VISUALIZER_STARTED,
            Some(json!({ "session": id, "name": audio.display_name() })),
        );

        let task = SessionTask {
            id,
            audio: audio.clone(),
            config: self.config.clone(),
            decoder: Arc::clone(&self.decoder),
            output: Arc::clone(&self.output),
            surface: Arc::clone(&self.surface),
            events: Arc::clone(&self.events),
            shared: Arc::clone(&self.shared),
            token: Arc::clone(&token),
        };
        let handle = runtime.spawn(task.run());
        *slot = Some(Session { id, token, handle });
        Some(id)
    }

    /// Stops the current session. Calling it again is a no-op.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            self.end(session);
        }
    }

    fn end(&self, session: Session) {
        session.token.cancel("visualizer stopped");
        session.handle.abort();
        if self.shared.lock().finish(session.id) {
            debug!(session = session.id, "Visualizer stopped");
            self.events
                .try_emit(VISUALIZER_STOPPED, Some(json!({ "session": session.id })));
        }
    }
}

impl Drop for AudioVisualizer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioVisualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("AudioVisualizer")
            .field("config", &self.config)
            .field("session_id", &shared.session_id)
            .field("state", &shared.state)
            .field("frames", &shared.frames)
            .finish_non_exhaustive()
    }
}

/// Everything one render session owns.
struct SessionTask {
    id: u64,
    audio: LocalAudio,
    config: VisualizerConfig,
    decoder: Arc<dyn AudioDecoder>,
    output: Arc<dyn AudioOutput>,
    surface: SharedSurface,
    events: Arc<dyn EventSink>,
    shared: Arc<Mutex<Shared>>,
    token: Arc<CancellationToken>,
}

impl SessionTask {
    async fn run(self) {
        let id = self.id;
        let shared = Arc::clone(&self.shared);
        let events = Arc::clone(&self.events);
        let _stopped = DropGuard::new(move || {
            if shared.lock().finish(id) {
                debug!(session = id, "Visualizer session ended");
                events.try_emit(VISUALIZER_STOPPED, Some(json!({ "session": id })));
            }
        });

        let decoding = {
            let decoder = Arc::clone(&self.decoder);
            let audio = self.audio.clone();
            tokio::task::spawn_blocking(move || decoder.decode(audio.bytes(), audio.mime_type()))
        };
        let outcome = tokio::select! {
            biased;
            () = self.token.cancelled() => {
                debug!(session = id, "Visualizer stopped while decoding");
                return;
            }
            joined = decoding => joined,
        };
        let decoded = match outcome {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(e)) => {
                self.decode_failed(&e.to_string());
                return;
            }
            Err(e) => {
                self.decode_failed(&format!("decoder task failed: {e}"));
                return;
            }
        };
        let mut analyser = match FrequencyAnalyser::new(&self.config) {
            Ok(analyser) => analyser,
            Err(e) => {
                warn!(session = id, error = %e, "Invalid analyser configuration");
                return;
            }
        };

        let sample_rate = decoded.sample_rate;
        let gain = GainStage::new(self.config.output_gain);
        let mut cursor = PlaybackCursor::new(decoded.samples, sample_rate, self.config.frame_rate);
        let mut gained = Vec::with_capacity(cursor.samples_per_frame());
        let mut bins = vec![0_u8; analyser.bin_count()];
        let mut interval = tokio::time::interval(self.config.frame_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let frame = cursor.next_frame();
            analyser.push_samples(frame);
            gain.apply_into(frame, &mut gained);
            self.output.write(sample_rate, &gained);

            analyser.byte_frequency_data(&mut bins);
            draw_frame(
                self.surface.lock().as_mut(),
                &bins,
                self.config.accent,
                self.config.bar_gap,
            );

            let current = self.shared.lock().record_frame(id);
            if !current {
                break;
            }
        }
    }

    fn decode_failed(&self, error: &str) {
        warn!(
            session = self.id,
            name = self.audio.display_name(),
            error,
            "Cannot decode audio for visualization"
        );
        self.events.try_emit(
            VISUALIZER_DECODE_FAILED,
            Some(json!({ "session": self.id, "error": error })),
        );
    }
}
