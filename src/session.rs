//! Per-file detection state owned by the host.
//!
//! A `Session` holds everything tied to one loaded media file: the spectral
//! sampler, the peak detector, the hit ledger and the live effect. Loading a
//! new file replaces all of it.

use std::ops::ControlFlow;

use indicatif::ProgressBar;
use serde::Serialize;

use crate::audio::spectrum::SpectralSampler;
use crate::clock::{FrameClock, FrameTick, Subscribers, Subscription};
use crate::config::EffectConfig;
use crate::detect::energy;
use crate::detect::ledger::{BassHit, HitLedger};
use crate::detect::peak::PeakDetector;
use crate::effect::{build_strategy, EffectInput, EffectMode, EffectPass, EffectStrategy, Transform};
use crate::error::MediaError;

pub struct Session<S: SpectralSampler> {
    sampler: Option<S>,
    detector: PeakDetector,
    ledger: HitLedger,
    strategy: Box<dyn EffectStrategy>,
    mode: EffectMode,
    seed: Option<u64>,
    latest_energy: f64,
    detection: Option<Subscription>,
}

impl<S: SpectralSampler> Session<S> {
    /// An empty session with no media loaded; detection is disabled until
    /// `load` supplies a sampler.
    pub fn new(effect: &EffectConfig) -> Self {
        Self {
            sampler: None,
            detector: PeakDetector::new(),
            ledger: HitLedger::new(),
            strategy: build_strategy(effect.mode, effect.seed),
            mode: effect.mode,
            seed: effect.seed,
            latest_energy: 0.0,
            detection: None,
        }
    }

    /// Attach a newly loaded file. `None` means its audio pipeline could not
    /// be set up.
    pub fn load(&mut self, sampler: Option<S>) {
        self.end_detection();
        self.ledger.clear();
        self.detector.reset();
        self.strategy = build_strategy(self.mode, self.seed);
        self.latest_energy = 0.0;

        match sampler {
            Some(mut sampler) => {
                sampler.reset();
                log::debug!(
                    "Sampler attached: {} bands @ {} Hz",
                    sampler.band_count(),
                    sampler.sample_rate()
                );
                self.sampler = Some(sampler);
            }
            None => {
                log::warn!("No audio pipeline for this media; bass detection and export are disabled");
                self.sampler = None;
            }
        }
    }

    pub fn detection_enabled(&self) -> bool {
        self.sampler.is_some()
    }

    pub fn ledger(&self) -> &HitLedger {
        &self.ledger
    }

    /// Start a detection pass. The returned handle is already cancelled when
    /// detection is disabled. A pass still running is cancelled first.
    pub fn begin_detection(&mut self) -> Subscription {
        self.end_detection();
        self.strategy.reset();
        let handle = Subscription::new();
        if self.detection_enabled() {
            self.detection = Some(handle.clone());
        } else {
            log::debug!("Detection requested without an audio pipeline");
            handle.cancel();
        }
        handle
    }

    pub fn end_detection(&mut self) {
        if let Some(handle) = self.detection.take() {
            handle.cancel();
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detection.as_ref().is_some_and(Subscription::is_active)
    }

    /// Sample the bass energy at `time` and remember it for the continuous
    /// effect.
    fn sample_energy(&mut self, time: f64) -> Option<f64> {
        let sampler = self.sampler.as_mut()?;
        let snapshot = sampler.poll(time);
        self.latest_energy = energy::estimate(&snapshot, sampler.sample_rate());
        Some(self.latest_energy)
    }

    /// One detection step. Paused and seeking frames are not sampled.
    pub fn poll(&mut self, tick: &FrameTick<'_>) -> Option<BassHit> {
        if tick.paused || tick.seeking {
            return None;
        }
        let energy = self.sample_energy(tick.time)?;
        self.detector.observe(energy, tick.time, &mut self.ledger)
    }

    /// Detect, then compute the live effect for this frame.
    pub fn live_frame(&mut self, tick: &FrameTick<'_>) -> Transform {
        if !self.detection_enabled() {
            return Transform::IDENTITY;
        }
        self.poll(tick);
        let input = self.effect_input(tick, EffectPass::Live);
        self.strategy.frame_transform(&input, &mut self.ledger)
    }

    /// Reset export-side state and hand out a fresh strategy for one export.
    pub(crate) fn prime_export(&mut self) -> Box<dyn EffectStrategy> {
        self.ledger.reset_consumption(EffectPass::Export);
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.reset();
        }
        self.latest_energy = 0.0;
        build_strategy(self.mode, self.seed)
    }

    /// The export counterpart of `live_frame`: same sampling and effect,
    /// but the ledger is only read.
    pub(crate) fn export_frame(
        &mut self,
        tick: &FrameTick<'_>,
        strategy: &mut dyn EffectStrategy,
    ) -> Transform {
        if !(tick.paused || tick.seeking) {
            self.sample_energy(tick.time);
        }
        let input = self.effect_input(tick, EffectPass::Export);
        strategy.frame_transform(&input, &mut self.ledger)
    }

    fn effect_input(&self, tick: &FrameTick<'_>, pass: EffectPass) -> EffectInput {
        EffectInput {
            time: tick.time,
            energy: self.latest_energy,
            paused: tick.paused,
            seeking: tick.seeking,
            pass,
        }
    }
}

/// Summary of one playback-driven detection pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// Frames played (paused ticks excluded).
    pub frames: u64,
    /// Hits accepted during this pass.
    pub hits: usize,
    /// Frames on which the live effect moved the picture.
    pub shaken_frames: u64,
}

/// Play `clock` through once with detection and the live effect attached.
pub fn run_detection_pass<S, C>(
    session: &mut Session<S>,
    clock: &mut C,
    progress: Option<&ProgressBar>,
) -> Result<PassReport, MediaError>
where
    S: SpectralSampler,
    C: FrameClock,
{
    let handle = session.begin_detection();
    if !handle.is_active() {
        return Ok(PassReport::default());
    }

    let known = session.ledger().len();
    let mut report = PassReport::default();
    let result = {
        let mut subscribers = Subscribers::new();
        let report = &mut report;
        let session = &mut *session;
        subscribers.subscribe_with(handle, move |tick| {
            let transform = session.live_frame(tick);
            if !tick.paused {
                report.frames += 1;
                if !transform.is_identity() {
                    report.shaken_frames += 1;
                    log::trace!("Live shake at {:.3}s: ({}, {})", tick.time, transform.dx, transform.dy);
                }
                if let Some(pb) = progress {
                    pb.inc(1);
                }
            }
            ControlFlow::Continue(())
        });
        clock.run(&mut subscribers)
    };
    session.end_detection();
    result?;

    report.hits = session.ledger().len() - known;
    log::info!(
        "Detection pass: {} frames, {} hits, {} shaken frames",
        report.frames,
        report.hits,
        report.shaken_frames
    );
    Ok(report)
}
