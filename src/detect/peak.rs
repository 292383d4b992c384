use super::ledger::{BassHit, HitLedger};
use crate::config::{MIN_PEAK_INTERVAL, PEAK_THRESHOLD};

/// Online threshold detector with two independent debounce checks.
///
/// A sustained bass note stays above threshold for many polls; the global
/// rate limit turns it into one hit. The neighbourhood check against the
/// ledger catches polls that straddle the rate-limit boundary.
#[derive(Clone, Debug, Default)]
pub struct PeakDetector {
    last_accepted: f64,
}

impl PeakDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> f64 {
        self.last_accepted
    }

    /// Clear state for a newly loaded media file.
    pub fn reset(&mut self) {
        self.last_accepted = 0.0;
    }

    pub fn observe(
        &mut self,
        energy: f64,
        current_time: f64,
        ledger: &mut HitLedger,
    ) -> Option<BassHit> {
        if energy <= PEAK_THRESHOLD {
            return None;
        }
        // Seeking backward makes this negative, which also rejects.
        if current_time - self.last_accepted <= MIN_PEAK_INTERVAL {
            return None;
        }
        if ledger.has_neighbour(current_time, MIN_PEAK_INTERVAL / 2.0) {
            return None;
        }

        let hit = ledger.insert(current_time).clone();
        self.last_accepted = current_time;
        log::debug!("Bass hit at {:.3}s (energy {:.1})", current_time, energy);
        Some(hit)
    }
}
