use rand::rngs::StdRng;
use rand::Rng;

use super::{EffectInput, EffectMode, EffectStrategy, Transform};
use crate::config::{VIBRATION_ENERGY_MAX_SCALE, VIBRATION_ENERGY_THRESHOLD, VIBRATION_MAX_AMPLITUDE};
use crate::detect::ledger::HitLedger;

/// Map bass energy onto 0-1: off at the vibration threshold, full at max scale.
///
/// The ramp is linear, but the rendered offset is not: `tick` rounds to whole
/// pixels, so nothing moves until the reach `2 * level` reaches half a pixel.
/// That puts the visible onset near energy 76, not 38.
pub fn normalize(energy: f64) -> f64 {
    if energy <= VIBRATION_ENERGY_THRESHOLD {
        return 0.0;
    }
    let span = VIBRATION_ENERGY_MAX_SCALE - VIBRATION_ENERGY_THRESHOLD;
    ((energy - VIBRATION_ENERGY_THRESHOLD) / span).clamp(0.0, 1.0)
}

/// Per-frame random jitter scaled by the energy envelope.
pub struct ContinuousVibration {
    rng: StdRng,
}

impl ContinuousVibration {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Fresh jitter every call. Offsets snap to whole pixels, so any energy
    /// up to about 76 (level 0.25, reach 0.5 px) always renders as identity.
    /// Between 76 and 190 the chance of movement grows with the reach.
    pub fn tick(&mut self, energy: f64, paused: bool, seeking: bool) -> Transform {
        if paused || seeking {
            return Transform::IDENTITY;
        }
        let level = normalize(energy);
        if level == 0.0 {
            return Transform::IDENTITY;
        }
        let reach = VIBRATION_MAX_AMPLITUDE * level;
        let dx = (self.rng.gen_range(-1.0..=1.0) * reach).round();
        let dy = (self.rng.gen_range(-1.0..=1.0) * reach).round();
        // round() can produce -0.0
        Transform::new(dx + 0.0, dy + 0.0)
    }
}

impl EffectStrategy for ContinuousVibration {
    fn mode(&self) -> EffectMode {
        EffectMode::Continuous
    }

    fn frame_transform(&mut self, input: &EffectInput, _ledger: &mut HitLedger) -> Transform {
        self.tick(input.energy, input.paused, input.seeking)
    }

    fn reset(&mut self) {}
}
