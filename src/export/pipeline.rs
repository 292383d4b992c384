use std::ops::ControlFlow;

use indicatif::ProgressBar;

use crate::audio::spectrum::SpectralSampler;
use crate::clock::{FrameClock, Subscribers};
use crate::encode::{Artifact, Recorder, RecordingSpec};
use crate::error::{ExportError, RecorderError};
use crate::media::MediaElement;
use crate::render::frame::ShakeCompositor;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Priming,
    Recording,
    Finalizing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportOutcome {
    pub artifact: Artifact,
    pub frames: u64,
    pub shaken_frames: u64,
}

/// Media element settings an export overrides and puts back afterwards.
struct SavedMedia {
    muted: bool,
    position: f64,
    rate: f64,
}

impl SavedMedia {
    fn capture<M: MediaElement>(media: &M) -> Self {
        Self {
            muted: media.muted(),
            position: media.current_time(),
            rate: media.playback_rate(),
        }
    }

    fn restore<M: MediaElement>(&self, media: &mut M) {
        media.pause();
        media.set_muted(self.muted);
        media.set_playback_rate(self.rate);
        media.seek(self.position);
    }
}

/// Re-renders the loaded media from the start with the effect baked in.
pub struct ExportPipeline {
    state: ExportState,
    progress: Option<ProgressBar>,
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportPipeline {
    pub fn new() -> Self {
        Self {
            state: ExportState::Idle,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    fn transition(&mut self, next: ExportState) {
        log::debug!("Export {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Play `media` from zero into `recorder`, shaking frames exactly as the
    /// live effect would. Media state is restored and the pipeline is idle
    /// again whatever the outcome.
    pub fn run<M, R, S>(
        &mut self,
        media: &mut M,
        recorder: &mut R,
        session: &mut Session<S>,
        spec: &RecordingSpec,
    ) -> Result<ExportOutcome, ExportError>
    where
        M: MediaElement + FrameClock,
        R: Recorder,
        S: SpectralSampler,
    {
        if !session.detection_enabled() {
            return Err(ExportError::Disabled);
        }
        if session.is_detecting() {
            return Err(ExportError::DetectionActive);
        }

        let saved = SavedMedia::capture(media);
        let result = self.record(media, recorder, session, spec);
        saved.restore(media);
        self.transition(ExportState::Idle);

        match &result {
            Ok(outcome) => log::info!(
                "Export complete: {} frames ({} shaken) -> {}",
                outcome.frames,
                outcome.shaken_frames,
                outcome.artifact.path.display()
            ),
            Err(e) => log::error!("Export failed: {}", e),
        }
        result
    }

    fn record<M, R, S>(
        &mut self,
        media: &mut M,
        recorder: &mut R,
        session: &mut Session<S>,
        spec: &RecordingSpec,
    ) -> Result<ExportOutcome, ExportError>
    where
        M: MediaElement + FrameClock,
        R: Recorder,
        S: SpectralSampler,
    {
        self.transition(ExportState::Priming);
        media.pause();
        media.seek(0.0);
        media.set_muted(true);
        media.set_playback_rate(1.0);
        let mut strategy = session.prime_export();
        let mut compositor = ShakeCompositor::new(spec.width, spec.height);

        recorder.start(spec)?;
        if let Err(e) = media.play() {
            recorder.abort();
            return Err(ExportError::PlaybackStart(e));
        }

        self.transition(ExportState::Recording);
        let progress = self.progress.clone();
        let mut frames = 0u64;
        let mut shaken_frames = 0u64;
        let mut failure: Option<RecorderError> = None;

        let played = {
            let mut subscribers = Subscribers::new();
            subscribers.subscribe(|tick| {
                if tick.paused || tick.ended {
                    return ControlFlow::Break(());
                }
                let Some(frame) = tick.frame else {
                    return ControlFlow::Continue(());
                };

                let transform = session.export_frame(tick, strategy.as_mut());
                let submitted = compositor
                    .compose(frame, transform)
                    .and_then(|pixels| recorder.submit_frame(pixels));
                if let Err(e) = submitted {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }

                frames += 1;
                if !transform.is_identity() {
                    shaken_frames += 1;
                    log::trace!("Export shake at {:.3}s: ({}, {})", tick.time, transform.dx, transform.dy);
                }
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                ControlFlow::Continue(())
            });
            media.run(&mut subscribers)
        };
        media.pause();

        if let Err(e) = played {
            recorder.abort();
            return Err(ExportError::Playback(e));
        }
        if let Some(e) = failure {
            recorder.abort();
            return Err(e.into());
        }

        self.transition(ExportState::Finalizing);
        let artifact = recorder.stop().map_err(|e| {
            recorder.abort();
            e
        })?;

        Ok(ExportOutcome {
            artifact,
            frames,
            shaken_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::spectrum::PulseSampler;
    use crate::clock::ScriptedClock;
    use crate::config::EffectConfig;
    use crate::effect::{EffectMode, Transform};
    use crate::encode::MemoryRecorder;
    use crate::error::MediaError;
    use crate::media::frames::{FrameSource, MemoryFrames};
    use crate::media::player::{OfflinePlayer, PauseHandle};
    use crate::media::{AudioSource, MediaInfo, VideoFrame};
    use crate::session::run_detection_pass;
    use std::path::PathBuf;

    const FPS: f64 = 25.0;

    fn info(duration: f64) -> MediaInfo {
        MediaInfo {
            width: 4,
            height: 2,
            fps: FPS,
            duration,
            has_audio: true,
        }
    }

    /// Every pixel distinct and non-black, so any shift changes the frame.
    fn paint(_time: f64, pixels: &mut [u8]) {
        for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[10 + i as u8, 20 + i as u8, 30 + i as u8, 255]);
        }
    }

    fn player(duration: f64) -> OfflinePlayer<MemoryFrames> {
        OfflinePlayer::new(MemoryFrames::generate(4, 2, FPS, duration, paint), &info(duration))
    }

    fn source_pixels() -> Vec<u8> {
        let mut pixels = vec![0u8; 4 * 2 * 4];
        paint(0.0, &mut pixels);
        pixels
    }

    fn recording_spec() -> RecordingSpec {
        RecordingSpec {
            output: PathBuf::from("shaken.mp4"),
            width: 4,
            height: 2,
            fps: FPS,
            audio_source: Some(PathBuf::from("input.mp4")),
        }
    }

    /// Session that has already run a detection pass over `pulses`.
    fn detected_session(pulses: &[(f64, f64)], duration: f64) -> Session<PulseSampler> {
        let mut session = Session::new(&EffectConfig {
            mode: EffectMode::Discrete,
            seed: Some(11),
        });
        session.load(Some(PulseSampler::new(pulses)));
        run_detection_pass(&mut session, &mut ScriptedClock::playing(0.0, duration, FPS), None).unwrap();
        session
    }

    #[test]
    fn hit_at_two_seconds_shakes_only_its_window() {
        let mut session = detected_session(&[(2.0, 2.05)], 3.0);
        assert_eq!(session.ledger().times(), vec![2.0]);

        let mut media = player(3.0);
        media.set_playback_rate(1.5);
        media.seek(1.0);
        let mut recorder = MemoryRecorder::default();
        let mut pipeline = ExportPipeline::new();

        let outcome = pipeline
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap();

        assert_eq!(outcome.frames, 75);
        assert_eq!(outcome.artifact.frames, 75);
        assert!(outcome.artifact.has_audio);
        assert_eq!(outcome.shaken_frames, 5);

        let source = source_pixels();
        for (i, frame) in recorder.frames.iter().enumerate() {
            let time = i as f64 / FPS;
            let in_window = time >= 2.0 - 1e-9 && time < 2.18;
            assert_eq!(frame != &source, in_window, "frame {} at {:.2}s", i, time);
        }

        let hit = session.ledger().iter().next().unwrap();
        assert!(hit.consumed_by_live && hit.consumed_by_export);

        assert_eq!(pipeline.state(), ExportState::Idle);
        assert!(!media.muted());
        assert_eq!(media.playback_rate(), 1.5);
        assert_eq!(media.current_time(), 1.0);
        assert!(media.is_paused());
    }

    #[test]
    fn continuous_export_matches_live_frame_for_frame() {
        let mut session = Session::new(&EffectConfig {
            mode: EffectMode::Continuous,
            seed: Some(5),
        });
        session.load(Some(PulseSampler::new(&[(0.0, 0.5), (1.0, 1.5)])));

        let mut live: Vec<Transform> = Vec::new();
        {
            let handle = session.begin_detection();
            let mut subscribers = Subscribers::new();
            let session = &mut session;
            let live = &mut live;
            subscribers.subscribe_with(handle, move |tick| {
                let transform = session.live_frame(tick);
                if !tick.paused {
                    live.push(transform);
                }
                ControlFlow::Continue(())
            });
            ScriptedClock::playing(0.0, 2.0, FPS).run(&mut subscribers).unwrap();
        }
        session.end_detection();
        assert_eq!(live.len(), 50);
        let live_shaken = live.iter().filter(|t| !t.is_identity()).count() as u64;
        assert!(live_shaken > 0);

        let mut media = player(2.0);
        let mut recorder = MemoryRecorder::default();
        let outcome = ExportPipeline::new()
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap();
        assert_eq!(outcome.shaken_frames, live_shaken);
        assert_eq!(recorder.frames.len(), live.len());

        let mut compositor = ShakeCompositor::new(4, 2);
        for (i, (recorded, transform)) in recorder.frames.iter().zip(&live).enumerate() {
            let source = VideoFrame {
                width: 4,
                height: 2,
                time: i as f64 / FPS,
                pixels: source_pixels(),
            };
            let expected = compositor.compose(&source, *transform).unwrap();
            assert_eq!(recorded.as_slice(), expected, "frame {} ({:?})", i, transform);
        }
    }

    #[test]
    fn repeated_export_shakes_again() {
        let mut session = detected_session(&[(2.0, 2.05)], 3.0);
        let mut media = player(3.0);
        let mut pipeline = ExportPipeline::new();

        for _ in 0..2 {
            let mut recorder = MemoryRecorder::default();
            let outcome = pipeline
                .run(&mut media, &mut recorder, &mut session, &recording_spec())
                .unwrap();
            assert_eq!(outcome.shaken_frames, 5);
        }
    }

    #[test]
    fn playback_failure_aborts_and_restores() {
        let mut session = detected_session(&[], 1.0);
        let mut media = player(0.0);
        let mut recorder = MemoryRecorder::default();
        let mut pipeline = ExportPipeline::new();

        let err = pipeline
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap_err();
        assert!(matches!(err, ExportError::PlaybackStart(_)));
        assert!(recorder.aborted);
        assert!(!recorder.is_recording());
        assert!(!media.muted());
        assert_eq!(pipeline.state(), ExportState::Idle);
    }

    #[test]
    fn recorder_start_failure_is_reported() {
        let mut session = detected_session(&[], 1.0);
        let mut media = player(1.0);
        let mut recorder = MemoryRecorder::default();
        recorder.fail_start = Some("no encoder".into());

        let err = ExportPipeline::new()
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap_err();
        assert!(matches!(err, ExportError::Recorder(RecorderError::Encoder(_))));
        assert!(media.is_paused());
        assert!(!media.muted());
    }

    /// Pauses the media from outside once enough frames have arrived.
    struct PausingRecorder {
        inner: MemoryRecorder,
        pause: PauseHandle,
        after: usize,
    }

    impl Recorder for PausingRecorder {
        fn start(&mut self, spec: &RecordingSpec) -> Result<(), RecorderError> {
            self.inner.start(spec)
        }

        fn submit_frame(&mut self, rgba: &[u8]) -> Result<(), RecorderError> {
            self.inner.submit_frame(rgba)?;
            if self.inner.frames.len() == self.after {
                self.pause.request();
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<Artifact, RecorderError> {
            self.inner.stop()
        }

        fn abort(&mut self) {
            self.inner.abort()
        }

        fn is_recording(&self) -> bool {
            self.inner.is_recording()
        }
    }

    #[test]
    fn external_pause_finalizes_early() {
        let mut session = detected_session(&[], 3.0);
        let mut media = player(3.0);
        let mut recorder = PausingRecorder {
            inner: MemoryRecorder::default(),
            pause: media.pause_handle(),
            after: 10,
        };

        let outcome = ExportPipeline::new()
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap();
        assert_eq!(outcome.frames, 10);
        assert_eq!(outcome.artifact.frames, 10);
        assert!(!recorder.inner.aborted);
        assert!(!media.ended());
    }

    /// Decodes `good` frames, then fails the way a crashed decoder does.
    struct BrokenFrames {
        inner: MemoryFrames,
        good: usize,
        served: usize,
    }

    impl FrameSource for BrokenFrames {
        fn next_frame(&mut self) -> Result<Option<VideoFrame>, MediaError> {
            if self.served == self.good {
                return Err(MediaError::Decode("decoder exited with status 1".into()));
            }
            self.served += 1;
            self.inner.next_frame()
        }

        fn seek(&mut self, time: f64) -> Result<(), MediaError> {
            self.served = 0;
            self.inner.seek(time)
        }
    }

    #[test]
    fn decoder_failure_discards_partial_recording() {
        let mut session = detected_session(&[(0.5, 0.6)], 2.0);
        let source = BrokenFrames {
            inner: MemoryFrames::generate(4, 2, FPS, 2.0, paint),
            good: 20,
            served: 0,
        };
        let mut media = OfflinePlayer::new(source, &info(2.0));
        let mut recorder = MemoryRecorder::default();
        let mut pipeline = ExportPipeline::new();

        let err = pipeline
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap_err();
        assert!(matches!(err, ExportError::Playback(MediaError::Decode(_))));
        assert!(recorder.aborted);
        assert!(!recorder.is_recording());
        assert_eq!(pipeline.state(), ExportState::Idle);
        assert!(!media.muted());
    }

    #[test]
    fn refuses_while_detecting() {
        let mut session = detected_session(&[], 1.0);
        let _handle = session.begin_detection();
        let mut media = player(1.0);
        let mut recorder = MemoryRecorder::default();

        let err = ExportPipeline::new()
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap_err();
        assert!(matches!(err, ExportError::DetectionActive));
        assert!(recorder.spec.is_none());
    }

    #[test]
    fn refuses_without_audio_pipeline() {
        let mut session: Session<PulseSampler> = Session::new(&EffectConfig::default());
        session.load(None);
        let mut media = player(1.0);
        let mut recorder = MemoryRecorder::default();

        let err = ExportPipeline::new()
            .run(&mut media, &mut recorder, &mut session, &recording_spec())
            .unwrap_err();
        assert!(matches!(err, ExportError::Disabled));
        assert!(recorder.spec.is_none());
    }
}
