//! End-to-end tests for the pipeline state machine.

#[cfg(test)]
mod tests {
    use crate::core::{Citation, ProcessingStatus, Stage, MSG_READY};
    use crate::errors::GatewayError;
    use crate::events::{CollectingEventSink, RESOURCE_RELEASED, RESULT_ABSORBED};
    use crate::gateway::RemoteAnalysis;
    use crate::input::{InputMode, LocalAudio};
    use crate::pipeline::{Rejection, SynesthesiaPipeline, Transition};
    use crate::testing::{CountingObjectUrls, RecordingSurface, ScriptedGateway, StaticDecoder};
    use crate::visualizer::{AudioVisualizer, VisualizerConfig, VisualizerState};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq};

    struct Harness {
        pipeline: SynesthesiaPipeline,
        gateway: Arc<ScriptedGateway>,
        urls: Arc<CountingObjectUrls>,
        events: Arc<CollectingEventSink>,
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let urls = Arc::new(CountingObjectUrls::new());
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = SynesthesiaPipeline::new(gateway.clone())
            .with_object_urls(urls.clone())
            .with_event_sink(events.clone());
        Harness {
            pipeline,
            gateway,
            urls,
            events,
        }
    }

    fn mp3(name: &str) -> LocalAudio {
        LocalAudio::new(name, "audio/mpeg", vec![0xFF_u8, 0xFB, 0x90, 0x00])
    }

    #[tokio::test]
    async fn test_local_audio_to_image() {
        let h = harness(
            ScriptedGateway::new().with_local(Ok("molten brass spirals in a dusk sky".into())),
        );
        let pipeline = &h.pipeline;

        assert_eq!(pipeline.select_local(mp3("song.mp3")), Transition::Applied(Stage::Idle));
        assert_eq!(pipeline.status().message(), "FILE_LOADED: SONG.MP3");
        assert!(pipeline.playback_url().is_some());

        assert_eq!(
            pipeline.start_analysis().await,
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(pipeline.prompt(), "molten brass spirals in a dusk sky");
        assert!(pipeline.sources().is_empty());
        assert_eq!(pipeline.status().progress(), 100);
        assert_eq!(h.gateway.last_mime_type().as_deref(), Some("audio/mpeg"));

        assert_eq!(
            pipeline.edit_prompt("molten brass spirals, no people"),
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(
            pipeline.synthesize().await,
            Transition::Applied(Stage::Completed)
        );
        assert_eq!(
            h.gateway.last_prompt().as_deref(),
            Some("molten brass spirals, no people")
        );

        let status = pipeline.status();
        assert_eq!(status.stage(), Stage::Completed);
        assert_eq!(status.progress(), 100);
        assert_eq!(status.message(), "PROCESS_COMPLETE");
        assert!(pipeline
            .image()
            .unwrap()
            .data_uri()
            .starts_with("data:image/png;base64,"));

        assert_eq!(
            h.events.stage_trail(),
            vec!["IDLE", "ANALYZING", "DREAMING", "PAINTING", "COMPLETED"]
        );
    }

    #[tokio::test]
    async fn test_remote_reference_with_citations() {
        let analysis = RemoteAnalysis::new("neon rain over a glass city")
            .with_source("Official Video", "https://a")
            .with_source("Lyrics", "https://b");
        let h = harness(ScriptedGateway::new().with_remote(Ok(analysis)));
        let pipeline = &h.pipeline;

        assert_eq!(
            pipeline.set_remote_url("https://youtu.be/xyz"),
            Transition::Applied(Stage::Idle)
        );
        assert_eq!(pipeline.input_mode(), InputMode::Remote);
        assert_eq!(pipeline.status().message(), "URL_LINKED");

        assert_eq!(
            pipeline.start_analysis().await,
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(h.gateway.last_reference().as_deref(), Some("https://youtu.be/xyz"));
        assert_eq!(
            pipeline.sources(),
            vec![
                Citation::new("Official Video", "https://a"),
                Citation::new("Lyrics", "https://b"),
            ]
        );
        assert_eq!(
            pipeline.synthesize().await,
            Transition::Applied(Stage::Completed)
        );
        assert_eq!(pipeline.sources().len(), 2);
        assert_eq!(h.urls.created(), 0);
    }

    #[tokio::test]
    async fn test_analysis_failure_surfaces_message() {
        let h = harness(
            ScriptedGateway::new().with_local(Err(GatewayError::analysis("quota exceeded"))),
        );
        let _ = h.pipeline.select_local(mp3("a.mp3"));

        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Applied(Stage::Error)
        );
        let status = h.pipeline.status();
        assert_eq!(status.message(), "ANALYSIS_FAILED");
        assert_eq!(status.error(), Some("quota exceeded"));
        assert_eq!(status.progress(), 0);

        // Error is left only by a fresh start or a reset.
        assert_eq!(
            h.pipeline.synthesize().await,
            Transition::Ignored(Rejection::Busy { stage: Stage::Error })
        );
        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(h.pipeline.status().error(), None);
        assert_eq!(h.gateway.local_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_image_is_rendering_failure() {
        let h = harness(
            ScriptedGateway::new()
                .with_image(Err(GatewayError::synthesis("Unable to generate image."))),
        );
        let _ = h.pipeline.select_local(mp3("a.mp3"));
        let _ = h.pipeline.start_analysis().await;

        assert_eq!(h.pipeline.synthesize().await, Transition::Applied(Stage::Error));
        let status = h.pipeline.status();
        assert_eq!(status.message(), "RENDERING_FAILURE");
        assert_eq!(status.error(), Some("Unable to generate image."));
        assert!(h.pipeline.image().is_none());
    }

    #[tokio::test]
    async fn test_remote_reference_with_failed_rendering() {
        let analysis = RemoteAnalysis::new("chrome dunes under a violet sun")
            .with_source("Official Video", "https://youtube.com/watch?v=xyz");
        let h = harness(
            ScriptedGateway::new()
                .with_remote(Ok(analysis))
                .with_image(Err(GatewayError::synthesis("no image returned"))),
        );
        let _ = h.pipeline.set_remote_url("https://youtu.be/xyz");

        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(h.pipeline.synthesize().await, Transition::Applied(Stage::Error));

        let status = h.pipeline.status();
        assert_eq!(status.stage(), Stage::Error);
        assert_eq!(status.progress(), 0);
        assert_eq!(status.message(), "RENDERING_FAILURE");
        assert_eq!(status.error(), Some("no image returned"));
        assert!(h.pipeline.image().is_none());
        assert_eq!(
            h.pipeline.sources(),
            vec![Citation::new("Official Video", "https://youtube.com/watch?v=xyz")]
        );
        assert_eq!(h.pipeline.prompt(), "chrome dunes under a violet sun");
        assert_eq!(h.gateway.remote_calls(), 1);
        assert_eq!(h.gateway.synthesize_calls(), 1);
        assert_eq!(
            h.events.stage_trail(),
            vec!["IDLE", "ANALYZING", "DREAMING", "PAINTING", "ERROR"]
        );
    }

    #[tokio::test]
    async fn test_reset_from_every_stage() {
        for target in [
            Stage::Dreaming,
            Stage::Painting,
            Stage::Completed,
            Stage::Error,
        ] {
            let gateway = match target {
                Stage::Error => {
                    ScriptedGateway::new().with_image(Err(GatewayError::synthesis("offline")))
                }
                _ => ScriptedGateway::new(),
            };
            let h = harness(gateway);
            let _ = h.pipeline.select_local(mp3("a.mp3"));
            let _ = h.pipeline.start_analysis().await;

            let mut in_flight = None;
            match target {
                Stage::Painting => {
                    let _gate = h.gateway.hold();
                    let mut synthesis = tokio_test::task::spawn(h.pipeline.synthesize());
                    assert_pending!(synthesis.poll());
                    in_flight = Some(synthesis);
                }
                Stage::Completed | Stage::Error => {
                    let _ = h.pipeline.synthesize().await;
                }
                _ => {}
            }
            assert_eq!(h.pipeline.stage(), target);

            assert_eq!(h.pipeline.reset(), Transition::Applied(Stage::Idle));
            if let Some(mut synthesis) = in_flight {
                assert_ready_eq!(synthesis.poll(), Transition::Absorbed);
            }

            let status = h.pipeline.status();
            assert_eq!(status.stage(), Stage::Idle, "reset from {target}");
            assert_eq!(status.progress(), 0, "reset from {target}");
            assert_eq!(status.error(), None, "reset from {target}");
            assert!(h.pipeline.artifact().is_empty(), "reset from {target}");
            assert!(h.pipeline.local_audio().is_none(), "reset from {target}");
            assert!(h.pipeline.playback_url().is_none(), "reset from {target}");
            assert!(h.urls.is_balanced(), "reset from {target}");

            let events = h.events.len();
            let _ = h.pipeline.reset();
            assert_eq!(h.events.len(), events, "second reset from {target}");
            assert_eq!(h.pipeline.status(), ProcessingStatus::ready());
        }
    }

    #[tokio::test]
    async fn test_blank_prompt_blocks_synthesis() {
        let h = harness(ScriptedGateway::new().with_local(Ok(String::new())));
        let _ = h.pipeline.select_local(mp3("a.mp3"));

        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Applied(Stage::Dreaming)
        );
        assert_eq!(h.pipeline.prompt(), "");
        assert_eq!(
            h.pipeline.synthesize().await,
            Transition::Ignored(Rejection::EmptyPrompt)
        );

        let _ = h.pipeline.edit_prompt("   \n");
        assert_eq!(
            h.pipeline.synthesize().await,
            Transition::Ignored(Rejection::EmptyPrompt)
        );
        assert_eq!(h.pipeline.stage(), Stage::Dreaming);
        assert_eq!(h.gateway.synthesize_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_without_input_is_noop() {
        let h = harness(ScriptedGateway::new());
        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Ignored(Rejection::NoInput)
        );

        let _ = h.pipeline.set_remote_url("   ");
        assert_eq!(h.pipeline.status().message(), MSG_READY);
        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Ignored(Rejection::NoInput)
        );
        assert_eq!(h.pipeline.stage(), Stage::Idle);
        assert_eq!(h.gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_audio_selection_is_rejected() {
        let h = harness(ScriptedGateway::new());
        let _ = h.pipeline.select_local(mp3("keep.mp3"));
        let before = h.pipeline.status();

        let result = h
            .pipeline
            .select_local(LocalAudio::new("cover.png", "image/png", vec![0_u8; 8]));
        assert_eq!(
            result,
            Transition::Ignored(Rejection::NotAudio {
                mime_type: "image/png".to_string()
            })
        );
        assert_eq!(h.pipeline.status(), before);
        assert_eq!(h.pipeline.local_audio().unwrap().display_name(), "keep.mp3");
        assert_eq!(h.urls.created(), 1);
        assert_eq!(h.urls.revoked(), 0);
    }

    #[tokio::test]
    async fn test_second_start_while_analyzing_is_ignored() {
        let h = harness(ScriptedGateway::new());
        let gate = h.gateway.hold();
        let _ = h.pipeline.select_local(mp3("a.mp3"));

        let mut first = tokio_test::task::spawn(h.pipeline.start_analysis());
        assert_pending!(first.poll());
        assert_eq!(h.pipeline.stage(), Stage::Analyzing);
        assert_eq!(h.pipeline.status().progress(), 30);

        assert_eq!(
            h.pipeline.start_analysis().await,
            Transition::Ignored(Rejection::Busy {
                stage: Stage::Analyzing
            })
        );
        assert_eq!(
            h.pipeline.edit_prompt("too early"),
            Transition::Ignored(Rejection::NotEditable {
                stage: Stage::Analyzing
            })
        );

        gate.notify_one();
        assert_ready_eq!(first.poll(), Transition::Applied(Stage::Dreaming));
        assert_eq!(h.gateway.local_calls(), 1);
    }

    #[tokio::test]
    async fn test_reset_during_analysis_absorbs_late_result() {
        let h = harness(ScriptedGateway::new());
        let _gate = h.gateway.hold();
        let _ = h.pipeline.select_local(mp3("a.mp3"));

        let mut analysis = tokio_test::task::spawn(h.pipeline.start_analysis());
        assert_pending!(analysis.poll());

        assert_eq!(h.pipeline.reset(), Transition::Applied(Stage::Idle));
        assert!(analysis.is_woken());
        assert_ready_eq!(analysis.poll(), Transition::Absorbed);

        assert!(h.pipeline.status().is_ready());
        assert!(h.pipeline.artifact().is_empty());
        assert!(h.pipeline.local_audio().is_none());
        assert!(h.urls.is_balanced());
        let absorbed = h.events.events_of_type(RESULT_ABSORBED);
        assert_eq!(absorbed.len(), 1);
        assert_eq!(absorbed[0].1.as_ref().unwrap()["reason"], "reset");
        assert_eq!(
            h.events.stage_trail(),
            vec!["IDLE", "ANALYZING", "IDLE"]
        );
    }

    #[tokio::test]
    async fn test_new_selection_supersedes_running_analysis() {
        let h = harness(ScriptedGateway::new());
        let gate = h.gateway.hold();
        let _ = h.pipeline.select_local(mp3("first.mp3"));

        let mut analysis = tokio_test::task::spawn(h.pipeline.start_analysis());
        assert_pending!(analysis.poll());

        let _ = h.pipeline.select_local(mp3("second.mp3"));
        gate.notify_one();
        assert_ready_eq!(analysis.poll(), Transition::Absorbed);

        let status = h.pipeline.status();
        assert_eq!(status.stage(), Stage::Idle);
        assert_eq!(status.message(), "FILE_LOADED: SECOND.MP3");
        assert_eq!(h.pipeline.prompt(), "");
        assert_eq!(h.urls.created(), 2);
        assert_eq!(h.urls.revoked(), 1);
        assert_eq!(h.urls.live(), 1);
        let absorbed = h.events.events_of_type(RESULT_ABSORBED);
        assert_eq!(absorbed[0].1.as_ref().unwrap()["reason"], "new selection");
    }

    #[tokio::test]
    async fn test_gateway_cancellation_is_not_an_error() {
        let h = harness(ScriptedGateway::new().with_local(Err(GatewayError::Cancelled)));
        let _ = h.pipeline.select_local(mp3("a.mp3"));

        assert_eq!(h.pipeline.start_analysis().await, Transition::Absorbed);
        let status = h.pipeline.status();
        assert_eq!(status.stage(), Stage::Analyzing);
        assert_eq!(status.error(), None);
        let absorbed = h.events.events_of_type(RESULT_ABSORBED);
        assert_eq!(absorbed[0].1.as_ref().unwrap()["reason"], "cancelled by gateway");

        let _ = h.pipeline.reset();
        assert!(h.pipeline.status().is_ready());
    }

    #[tokio::test]
    async fn test_mode_switch_releases_url_once() {
        let h = harness(ScriptedGateway::new());
        let _ = h.pipeline.select_local(mp3("a.mp3"));
        let _ = h.pipeline.start_analysis().await;
        assert_eq!(h.pipeline.stage(), Stage::Dreaming);

        assert_eq!(
            h.pipeline.set_input_mode(InputMode::Remote),
            Transition::Applied(Stage::Idle)
        );
        assert_eq!(h.urls.revoked(), 1);
        assert!(h.pipeline.artifact().is_empty());
        assert!(h.pipeline.status().is_ready());

        assert_eq!(
            h.pipeline.set_input_mode(InputMode::Remote),
            Transition::Ignored(Rejection::Unchanged)
        );
        let _ = h.pipeline.reset();
        let _ = h.pipeline.set_input_mode(InputMode::Local);
        assert_eq!(h.urls.revoked(), 1);
        assert!(h.urls.is_balanced());
        assert_eq!(h.events.events_of_type(RESOURCE_RELEASED).len(), 1);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_and_keeps_mode() {
        let h = harness(ScriptedGateway::new());
        let _ = h.pipeline.set_remote_url("https://youtu.be/xyz");
        let _ = h.pipeline.start_analysis().await;

        let _ = h.pipeline.reset();
        let first = h.pipeline.status();
        let events = h.events.len();
        let _ = h.pipeline.reset();

        assert_eq!(h.pipeline.status(), first);
        assert_eq!(first, ProcessingStatus::ready());
        assert_eq!(h.events.len(), events);
        assert_eq!(h.pipeline.input_mode(), InputMode::Remote);
        assert_eq!(h.pipeline.remote_url().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_drop_releases_object_url() {
        let h = harness(ScriptedGateway::new());
        let _ = h.pipeline.select_local(mp3("a.mp3"));
        let urls = Arc::clone(&h.urls);
        drop(h);
        assert!(urls.is_balanced());
        assert_eq!(urls.live(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_observe_status() {
        let h = harness(ScriptedGateway::new());
        let mut rx = h.pipeline.subscribe();
        let _ = h.pipeline.select_local(mp3("a.mp3"));
        let _ = h.pipeline.start_analysis().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().stage(), Stage::Dreaming);
    }

    #[tokio::test]
    async fn test_error_recovers_through_new_selection() {
        let h = harness(ScriptedGateway::new().with_local(Err(GatewayError::analysis("boom"))));
        let _ = h.pipeline.select_local(mp3("a.mp3"));
        let _ = h.pipeline.start_analysis().await;
        assert_eq!(h.pipeline.stage(), Stage::Error);

        let _ = h.pipeline.select_local(mp3("b.mp3"));
        let status = h.pipeline.status();
        assert_eq!(status.stage(), Stage::Idle);
        assert_eq!(status.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visualizer_follows_local_selection() {
        let surface = RecordingSurface::new(320, 80);
        let visualizer = Arc::new(
            AudioVisualizer::new(VisualizerConfig::default(), surface.clone())
                .unwrap()
                .with_decoder(Arc::new(StaticDecoder::tone(8000, 440.0, 1.0))),
        );
        let gateway = Arc::new(ScriptedGateway::new());
        let pipeline =
            SynesthesiaPipeline::new(gateway.clone()).with_visualizer(visualizer.clone());

        let _ = pipeline.select_local(mp3("a.mp3"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(visualizer.state(), VisualizerState::Running);

        // Gateway phases never interrupt rendering.
        let _ = pipeline.start_analysis().await;
        let _ = pipeline.synthesize().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pipeline.stage(), Stage::Completed);
        assert!(visualizer.is_running());

        let _ = pipeline.reset();
        assert_eq!(visualizer.state(), VisualizerState::Stopped);
        let frames = surface.frame_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(surface.frame_count(), frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_mode_stops_visualizer() {
        let surface = RecordingSurface::new(64, 64);
        let visualizer = Arc::new(
            AudioVisualizer::new(VisualizerConfig::default(), surface)
                .unwrap()
                .with_decoder(Arc::new(StaticDecoder::silence(8000, 0.5))),
        );
        let pipeline = SynesthesiaPipeline::new(Arc::new(ScriptedGateway::new()))
            .with_visualizer(visualizer.clone());

        let _ = pipeline.select_local(mp3("a.mp3"));
        assert!(visualizer.is_running());
        let _ = pipeline.set_remote_url("https://youtu.be/xyz");
        assert!(!visualizer.is_running());
    }
}
