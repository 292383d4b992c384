use rand::rngs::StdRng;
use rand::Rng;

use super::{EffectInput, EffectMode, EffectPass, EffectStrategy, Transform};
use crate::config::{MIN_SHAKE_WINDOW, SHAKE_AMPLITUDE_PX, SHAKE_DURATION_MS};
use crate::detect::ledger::HitLedger;

/// What the discrete shake does on the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShakeInstruction {
    /// A hit fired on this frame.
    Start { hit_time: f64 },
    /// Still inside the window of a hit fired earlier.
    Sustain,
    Inactive,
}

impl ShakeInstruction {
    pub fn is_active(&self) -> bool {
        !matches!(self, ShakeInstruction::Inactive)
    }
}

/// Seconds a single hit keeps the frame shaking.
pub fn shake_window() -> f64 {
    (SHAKE_DURATION_MS / 1000.0).max(MIN_SHAKE_WINDOW)
}

pub struct DiscreteShake {
    rng: StdRng,
    /// `[start, end)` of the shake currently playing.
    active: Option<(f64, f64)>,
}

impl DiscreteShake {
    pub fn new(rng: StdRng) -> Self {
        Self { rng, active: None }
    }

    /// Fire every unconsumed hit whose window contains `current_time`.
    ///
    /// Consumption is sticky for the pass: seeking back over a fired hit
    /// and playing through it again does not shake a second time.
    pub fn tick(
        &mut self,
        current_time: f64,
        ledger: &mut HitLedger,
        pass: EffectPass,
    ) -> ShakeInstruction {
        let window = shake_window();
        let mut started = None;

        for hit in ledger
            .hits_in_mut(current_time - window, f64::INFINITY)
            .iter_mut()
            .take_while(|h| h.time <= current_time)
        {
            if current_time >= hit.time + window || hit.is_consumed(pass) {
                continue;
            }
            hit.consume(pass);
            started = Some(hit.time);
            let end = hit.time + window;
            self.active = match self.active {
                Some((start, prev_end)) if prev_end > end => Some((start, prev_end)),
                _ => Some((hit.time, end)),
            };
        }

        if let Some(hit_time) = started {
            log::trace!("Shake start at {:.3}s (hit {:.3}s)", current_time, hit_time);
            return ShakeInstruction::Start { hit_time };
        }

        match self.active {
            Some((start, end)) if current_time >= start && current_time < end => {
                ShakeInstruction::Sustain
            }
            _ => {
                self.active = None;
                ShakeInstruction::Inactive
            }
        }
    }

    /// Whole-pixel offset between half and full amplitude, random sign per axis.
    fn jitter(&mut self) -> Transform {
        let axis = |rng: &mut StdRng| {
            let magnitude = rng.gen_range(0.5..=1.0) * SHAKE_AMPLITUDE_PX;
            let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            (sign * magnitude).round()
        };
        let dx = axis(&mut self.rng);
        let dy = axis(&mut self.rng);
        Transform::new(dx, dy)
    }
}

impl EffectStrategy for DiscreteShake {
    fn mode(&self) -> EffectMode {
        EffectMode::Discrete
    }

    fn frame_transform(&mut self, input: &EffectInput, ledger: &mut HitLedger) -> Transform {
        if input.paused {
            return Transform::IDENTITY;
        }
        if self.tick(input.time, ledger, input.pass).is_active() {
            self.jitter()
        } else {
            Transform::IDENTITY
        }
    }

    fn reset(&mut self) {
        self.active = None;
    }
}
