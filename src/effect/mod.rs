//! Shake effects driven by detected hits or by instantaneous bass energy.
//!
//! Both strategies only translate the frame. An earlier variant also
//! rotated the frame during a discrete shake; it was removed and is not
//! offered.

pub mod continuous;
pub mod discrete;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::detect::ledger::HitLedger;

pub use continuous::ContinuousVibration;
pub use discrete::DiscreteShake;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EffectMode {
    /// Short shake on every detected hit.
    #[default]
    Discrete,
    /// Jitter that follows the bass energy envelope.
    Continuous,
}

/// Which pass is consuming hits. Each pass fires a hit at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectPass {
    Live,
    Export,
}

/// Frame translation in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    pub dx: f64,
    pub dy: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { dx: 0.0, dy: 0.0 };

    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_identity(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Playback state seen by a strategy for one frame.
#[derive(Clone, Copy, Debug)]
pub struct EffectInput {
    pub time: f64,
    pub energy: f64,
    pub paused: bool,
    pub seeking: bool,
    pub pass: EffectPass,
}

pub trait EffectStrategy {
    fn mode(&self) -> EffectMode;

    fn frame_transform(&mut self, input: &EffectInput, ledger: &mut HitLedger) -> Transform;

    /// Forget any in-flight animation (new file or new pass).
    fn reset(&mut self);
}

pub fn build_strategy(mode: EffectMode, seed: Option<u64>) -> Box<dyn EffectStrategy> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    match mode {
        EffectMode::Discrete => Box::new(DiscreteShake::new(rng)),
        EffectMode::Continuous => Box::new(ContinuousVibration::new(rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_requested_mode() {
        assert_eq!(build_strategy(EffectMode::Discrete, Some(1)).mode(), EffectMode::Discrete);
        assert_eq!(build_strategy(EffectMode::Continuous, None).mode(), EffectMode::Continuous);
    }

    #[test]
    fn same_seed_same_jitter() {
        let mut ledger = HitLedger::new();
        let input = EffectInput {
            time: 1.0,
            energy: 255.0,
            paused: false,
            seeking: false,
            pass: EffectPass::Live,
        };
        let mut a = build_strategy(EffectMode::Continuous, Some(42));
        let mut b = build_strategy(EffectMode::Continuous, Some(42));
        for _ in 0..10 {
            assert_eq!(
                a.frame_transform(&input, &mut ledger),
                b.frame_transform(&input, &mut ledger)
            );
        }
    }
}
