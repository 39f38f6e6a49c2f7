//! The synesthesia pipeline state machine.
//!
//! [`SynesthesiaPipeline`] owns the processing status, the active input, the
//! derived artifact and the playback resource. Every operation is guarded by
//! the current stage and returns a [`Transition`] describing what happened.
//!
//! Gateway calls run without holding the state lock. Each call is raced
//! against a per-run [`CancellationToken`]; reset, a new selection or a mode
//! change cancel that token, so a late result is absorbed instead of applied.

mod transition;

#[cfg(test)]
mod integration_tests;

pub use transition::{Rejection, Transition};

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cancellation::CancellationToken;
use crate::core::{
    Citation, DerivedArtifact, ImageArtifact, ProcessingStatus, Stage, MSG_ANALYSIS_FAILED,
    MSG_RENDERING_FAILED, MSG_URL_LINKED,
};
use crate::errors::GatewayError;
use crate::events::{
    EventSink, NoOpEventSink, INPUT_REJECTED, INPUT_SELECTED, RESOURCE_RELEASED,
    RESULT_ABSORBED, STAGE_CHANGED,
};
use crate::gateway::{InferenceGateway, RemoteAnalysis};
use crate::input::{
    loaded_message, resolve_local, resolve_remote, InMemoryObjectUrls, InputMode, InputSelection,
    LocalAudio, ObjectUrl, ObjectUrlRegistry, PlaybackResource,
};
use crate::visualizer::AudioVisualizer;

/// A local binary together with the object URL that plays it.
struct BoundAudio {
    audio: LocalAudio,
    playback: PlaybackResource,
}

/// The active input. Exactly one kind is active at a time.
enum Binding {
    Local(Option<BoundAudio>),
    Remote(String),
}

impl Binding {
    fn empty(mode: InputMode) -> Self {
        match mode {
            InputMode::Local => Self::Local(None),
            InputMode::Remote => Self::Remote(String::new()),
        }
    }

    fn mode(&self) -> InputMode {
        match self {
            Self::Local(_) => InputMode::Local,
            Self::Remote(_) => InputMode::Remote,
        }
    }
}

/// The gateway call currently awaited.
struct InFlight {
    generation: u64,
    token: Arc<CancellationToken>,
}

struct PipelineInner {
    status: ProcessingStatus,
    binding: Binding,
    artifact: DerivedArtifact,
    run: Option<InFlight>,
    generation: u64,
}

impl PipelineInner {
    /// Returns true if `generation` is still the live, uncancelled run.
    fn is_current(&self, generation: u64) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.generation == generation && !run.token.is_cancelled())
    }
}

/// Pipeline from an audio input to a prompt and an image.
pub struct SynesthesiaPipeline {
    gateway: Arc<dyn InferenceGateway>,
    object_urls: Arc<dyn ObjectUrlRegistry>,
    visualizer: Option<Arc<AudioVisualizer>>,
    events: Arc<dyn EventSink>,
    inner: Mutex<PipelineInner>,
    status_tx: watch::Sender<ProcessingStatus>,
}

impl SynesthesiaPipeline {
    /// Creates an idle pipeline in local mode.
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        let (status_tx, _) = watch::channel(ProcessingStatus::ready());
        Self {
            gateway,
            object_urls: Arc::new(InMemoryObjectUrls::new()),
            visualizer: None,
            events: Arc::new(NoOpEventSink),
            inner: Mutex::new(PipelineInner {
                status: ProcessingStatus::ready(),
                binding: Binding::empty(InputMode::default()),
                artifact: DerivedArtifact::default(),
                run: None,
                generation: 0,
            }),
            status_tx,
        }
    }

    /// Sets the registry that issues object URLs for local audio.
    #[must_use]
    pub fn with_object_urls(mut self, object_urls: Arc<dyn ObjectUrlRegistry>) -> Self {
        self.object_urls = object_urls;
        self
    }

    /// Attaches a visualizer driven by the local selection.
    #[must_use]
    pub fn with_visualizer(mut self, visualizer: Arc<AudioVisualizer>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    // --- input ---------------------------------------------------------------

    /// Binds a local audio binary, superseding whatever was active.
    ///
    /// Non-audio media types are rejected without touching state.
    pub fn select_local(&self, audio: LocalAudio) -> Transition {
        let audio = match resolve_local(audio) {
            Ok(audio) => audio,
            Err(rejection) => return self.reject(rejection),
        };

        let mut inner = self.inner.lock();
        self.supersede(&mut inner, "new selection");
        self.release_local(&mut inner);

        let playback = PlaybackResource::acquire(Arc::clone(&self.object_urls), &audio);
        info!(
            name = audio.display_name(),
            mime_type = audio.mime_type(),
            bytes = audio.bytes().len(),
            "Local audio selected"
        );
        self.events.try_emit(
            INPUT_SELECTED,
            Some(json!({
                "mode": InputMode::Local,
                "name": audio.display_name(),
                "mime_type": audio.mime_type(),
                "url": playback.url().map(ObjectUrl::as_str),
            })),
        );
        inner.binding = Binding::Local(Some(BoundAudio {
            audio: audio.clone(),
            playback,
        }));
        inner.artifact.clear();
        self.set_status(&mut inner, ProcessingStatus::idle(loaded_message(&audio)));

        if let Some(visualizer) = &self.visualizer {
            visualizer.start(&audio);
        }
        Transition::Applied(Stage::Idle)
    }

    /// Links a remote reference, switching to remote mode if needed.
    ///
    /// The URL is not validated here; blank URLs are refused at dispatch.
    pub fn set_remote_url(&self, url: impl Into<String>) -> Transition {
        let url = url.into();
        let mut inner = self.inner.lock();
        if matches!(&inner.binding, Binding::Remote(current) if *current == url) {
            return Transition::Ignored(Rejection::Unchanged);
        }

        self.supersede(&mut inner, "new remote reference");
        if inner.binding.mode() == InputMode::Local {
            self.release_local(&mut inner);
            self.stop_visualizer();
        }

        let status = match resolve_remote(&url) {
            Ok(InputSelection::Remote(_)) => ProcessingStatus::idle(MSG_URL_LINKED),
            _ => ProcessingStatus::ready(),
        };
        info!(url = %url, "Remote reference linked");
        self.events.try_emit(
            INPUT_SELECTED,
            Some(json!({ "mode": InputMode::Remote, "url": url })),
        );
        inner.binding = Binding::Remote(url);
        inner.artifact.clear();
        self.set_status(&mut inner, status);
        Transition::Applied(Stage::Idle)
    }

    /// Switches between local and remote input.
    ///
    /// A change drops the local binary, stops the visualizer and clears
    /// everything derived from the previous input.
    pub fn set_input_mode(&self, mode: InputMode) -> Transition {
        let mut inner = self.inner.lock();
        if inner.binding.mode() == mode {
            return Transition::Ignored(Rejection::Unchanged);
        }

        self.supersede(&mut inner, "input mode changed");
        self.release_local(&mut inner);
        self.stop_visualizer();
        inner.binding = Binding::empty(mode);
        inner.artifact.clear();
        info!(mode = %mode, "Input mode changed");
        self.set_status(&mut inner, ProcessingStatus::ready());
        Transition::Applied(Stage::Idle)
    }

    // --- gateway phases ----------------------------------------------------------

    /// Sends the active input for analysis and moves to `Dreaming` on success.
    ///
    /// Accepted only from `Idle` or `Error`, and only with a bound input.
    pub async fn start_analysis(&self) -> Transition {
        let (request, token, generation) = {
            let mut inner = self.inner.lock();
            let stage = inner.status.stage();
            if !stage.accepts_analysis() {
                debug!(stage = %stage, "Analysis refused while busy");
                return Transition::Ignored(Rejection::Busy { stage });
            }
            let request = match &inner.binding {
                Binding::Local(Some(bound)) => AnalysisRequest::Local {
                    payload: bound.audio.to_base64(),
                    mime_type: bound.audio.mime_type().to_string(),
                },
                Binding::Remote(url) => match resolve_remote(url) {
                    Ok(_) => AnalysisRequest::Remote(url.trim().to_string()),
                    Err(rejection) => return self.reject(rejection),
                },
                Binding::Local(None) => return self.reject(Rejection::NoInput),
            };
            inner.artifact.clear();
            let (generation, token) = self.begin_run(&mut inner);
            self.set_status(&mut inner, ProcessingStatus::analyzing());
            (request, token, generation)
        };

        let outcome = token
            .run_until_cancelled(async {
                match &request {
                    AnalysisRequest::Local { payload, mime_type } => self
                        .gateway
                        .analyze_local(payload, mime_type)
                        .await
                        .map(RemoteAnalysis::new),
                    AnalysisRequest::Remote(url) => self.gateway.analyze_remote(url).await,
                }
            })
            .await;

        let mut inner = self.inner.lock();
        let result = match outcome {
            Some(result) if inner.is_current(generation) => result,
            _ => return self.absorb("analysis", generation, &token),
        };
        inner.run = None;
        match result {
            Ok(analysis) => {
                debug!(
                    prompt_len = analysis.prompt.len(),
                    sources = analysis.sources.len(),
                    "Analysis completed"
                );
                inner.artifact.prompt = analysis.prompt;
                inner.artifact.sources = analysis.sources;
                self.set_status(&mut inner, ProcessingStatus::dreaming());
                Transition::Applied(Stage::Dreaming)
            }
            Err(GatewayError::Cancelled) => self.absorb("analysis", generation, &token),
            Err(e) => {
                error!(error = %e, "Analysis failed");
                self.set_status(
                    &mut inner,
                    ProcessingStatus::failed(MSG_ANALYSIS_FAILED, e.to_string()),
                );
                Transition::Applied(Stage::Error)
            }
        }
    }

    /// Renders the current prompt and moves to `Completed` on success.
    ///
    /// Accepted only from `Dreaming` with a non-blank prompt.
    pub async fn synthesize(&self) -> Transition {
        let (prompt, token, generation) = {
            let mut inner = self.inner.lock();
            let stage = inner.status.stage();
            if stage != Stage::Dreaming {
                debug!(stage = %stage, "Synthesis refused outside dreaming");
                return Transition::Ignored(Rejection::Busy { stage });
            }
            if inner.artifact.prompt.trim().is_empty() {
                return Transition::Ignored(Rejection::EmptyPrompt);
            }
            let prompt = inner.artifact.prompt.clone();
            let (generation, token) = self.begin_run(&mut inner);
            self.set_status(&mut inner, ProcessingStatus::painting());
            (prompt, token, generation)
        };

        let outcome = token
            .run_until_cancelled(self.gateway.synthesize_image(&prompt))
            .await;

        let mut inner = self.inner.lock();
        let result = match outcome {
            Some(result) if inner.is_current(generation) => result,
            _ => return self.absorb("synthesis", generation, &token),
        };
        inner.run = None;
        match result {
            Ok(image) => {
                debug!(media_type = image.media_type(), "Synthesis completed");
                inner.artifact.image = Some(image);
                self.set_status(&mut inner, ProcessingStatus::completed());
                Transition::Applied(Stage::Completed)
            }
            Err(GatewayError::Cancelled) => self.absorb("synthesis", generation, &token),
            Err(e) => {
                error!(error = %e, "Synthesis failed");
                self.set_status(
                    &mut inner,
                    ProcessingStatus::failed(MSG_RENDERING_FAILED, e.to_string()),
                );
                Transition::Applied(Stage::Error)
            }
        }
    }

    /// Replaces the prompt. Only allowed while dreaming.
    pub fn edit_prompt(&self, text: impl Into<String>) -> Transition {
        let mut inner = self.inner.lock();
        let stage = inner.status.stage();
        if stage != Stage::Dreaming {
            return Transition::Ignored(Rejection::NotEditable { stage });
        }
        inner.artifact.prompt = text.into();
        Transition::Applied(Stage::Dreaming)
    }

    /// Returns to the initial state, keeping the input mode.
    ///
    /// Cancels any in-flight call, releases the object URL, stops the
    /// visualizer and clears the selection and artifact. Safe to repeat.
    pub fn reset(&self) -> Transition {
        let mut inner = self.inner.lock();
        self.supersede(&mut inner, "reset");
        self.release_local(&mut inner);
        self.stop_visualizer();
        let mode = inner.binding.mode();
        inner.binding = Binding::empty(mode);
        inner.artifact.clear();
        if !inner.status.is_ready() {
            info!("Pipeline reset");
            self.set_status(&mut inner, ProcessingStatus::ready());
        }
        Transition::Applied(Stage::Idle)
    }

    // --- state surface -----------------------------------------------------------

    /// Snapshot of the processing status.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.inner.lock().status.clone()
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.inner.lock().status.stage()
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProcessingStatus> {
        self.status_tx.subscribe()
    }

    /// Snapshot of the derived artifact.
    #[must_use]
    pub fn artifact(&self) -> DerivedArtifact {
        self.inner.lock().artifact.clone()
    }

    /// Current prompt; empty before analysis.
    #[must_use]
    pub fn prompt(&self) -> String {
        self.inner.lock().artifact.prompt.clone()
    }

    /// Citations from the last remote analysis.
    #[must_use]
    pub fn sources(&self) -> Vec<Citation> {
        self.inner.lock().artifact.sources.clone()
    }

    /// The generated image, once completed.
    #[must_use]
    pub fn image(&self) -> Option<ImageArtifact> {
        self.inner.lock().artifact.image.clone()
    }

    /// Active input mode.
    #[must_use]
    pub fn input_mode(&self) -> InputMode {
        self.inner.lock().binding.mode()
    }

    /// The bound local audio, if any.
    #[must_use]
    pub fn local_audio(&self) -> Option<LocalAudio> {
        match &self.inner.lock().binding {
            Binding::Local(Some(bound)) => Some(bound.audio.clone()),
            _ => None,
        }
    }

    /// Object URL of the bound local audio, if any.
    #[must_use]
    pub fn playback_url(&self) -> Option<ObjectUrl> {
        match &self.inner.lock().binding {
            Binding::Local(Some(bound)) => bound.playback.url().cloned(),
            _ => None,
        }
    }

    /// The linked remote reference, if in remote mode.
    #[must_use]
    pub fn remote_url(&self) -> Option<String> {
        match &self.inner.lock().binding {
            Binding::Remote(url) => Some(url.clone()),
            Binding::Local(_) => None,
        }
    }

    // --- internals -----------------------------------------------------------------

    fn set_status(&self, inner: &mut PipelineInner, status: ProcessingStatus) {
        let from = inner.status.stage();
        let to = status.stage();
        info!(from = %from, to = %to, message = status.message(), progress = status.progress(), "Stage changed");
        self.events.try_emit(
            STAGE_CHANGED,
            Some(json!({
                "from": from,
                "to": to,
                "message": status.message(),
                "progress": status.progress(),
                "error": status.error(),
            })),
        );
        inner.status = status.clone();
        self.status_tx.send_replace(status);
    }

    fn begin_run(&self, inner: &mut PipelineInner) -> (u64, Arc<CancellationToken>) {
        self.supersede(inner, "superseded");
        inner.generation += 1;
        let token = Arc::new(CancellationToken::new());
        inner.run = Some(InFlight {
            generation: inner.generation,
            token: Arc::clone(&token),
        });
        (inner.generation, token)
    }

    /// Cancels the in-flight call, if any. Its result will be absorbed.
    fn supersede(&self, inner: &mut PipelineInner, reason: &str) {
        if let Some(run) = inner.run.take() {
            debug!(generation = run.generation, reason, "Cancelling in-flight call");
            run.token.cancel(reason);
        }
    }

    fn release_local(&self, inner: &mut PipelineInner) {
        if let Binding::Local(slot) = &mut inner.binding {
            if let Some(mut bound) = slot.take() {
                if let Some(url) = bound.playback.release() {
                    self.events
                        .try_emit(RESOURCE_RELEASED, Some(json!({ "url": url.as_str() })));
                }
            }
        }
    }

    fn stop_visualizer(&self) {
        if let Some(visualizer) = &self.visualizer {
            visualizer.stop();
        }
    }

    fn reject(&self, rejection: Rejection) -> Transition {
        warn!(reason = %rejection, "Input rejected");
        self.events.try_emit(
            INPUT_REJECTED,
            serde_json::to_value(&rejection).ok(),
        );
        Transition::Ignored(rejection)
    }

    fn absorb(&self, phase: &str, generation: u64, token: &CancellationToken) -> Transition {
        let reason = token
            .reason()
            .unwrap_or_else(|| "cancelled by gateway".to_string());
        warn!(phase, generation, %reason, "Discarding result of cancelled call");
        self.events.try_emit(
            RESULT_ABSORBED,
            Some(json!({ "phase": phase, "generation": generation, "reason": reason })),
        );
        Transition::Absorbed
    }
}

impl Drop for SynesthesiaPipeline {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(run) = inner.run.take() {
            run.token.cancel("pipeline dropped");
        }
        if let Binding::Local(slot) = &mut inner.binding {
            if let Some(mut bound) = slot.take() {
                bound.playback.release();
            }
        }
        if let Some(visualizer) = &self.visualizer {
            visualizer.stop();
        }
    }
}

impl std::fmt::Debug for SynesthesiaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SynesthesiaPipeline")
            .field("status", &inner.status)
            .field("mode", &inner.binding.mode())
            .field("generation", &inner.generation)
            .field("in_flight", &inner.run.is_some())
            .finish_non_exhaustive()
    }
}

/// What the analysis phase sends to the gateway.
enum AnalysisRequest {
    Local { payload: String, mime_type: String },
    Remote(String),
}
