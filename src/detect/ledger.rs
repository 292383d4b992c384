use serde::Serialize;

use crate::effect::EffectPass;

/// A detected bass hit. Live playback and export each consume it once.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BassHit {
    /// Media-relative time in seconds.
    pub time: f64,
    #[serde(skip)]
    pub consumed_by_live: bool,
    #[serde(skip)]
    pub consumed_by_export: bool,
}

impl BassHit {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            consumed_by_live: false,
            consumed_by_export: false,
        }
    }

    pub fn is_consumed(&self, pass: EffectPass) -> bool {
        match pass {
            EffectPass::Live => self.consumed_by_live,
            EffectPass::Export => self.consumed_by_export,
        }
    }

    pub fn consume(&mut self, pass: EffectPass) {
        match pass {
            EffectPass::Live => self.consumed_by_live = true,
            EffectPass::Export => self.consumed_by_export = true,
        }
    }
}

/// Hits of the current media file, kept sorted ascending by time.
#[derive(Clone, Debug, Default)]
pub struct HitLedger {
    hits: Vec<BassHit>,
}

impl HitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BassHit> {
        self.hits.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.time).collect()
    }

    /// Insert a hit at its sorted position and return it.
    pub fn insert(&mut self, time: f64) -> &BassHit {
        let idx = self.hits.partition_point(|h| h.time <= time);
        self.hits.insert(idx, BassHit::new(time));
        &self.hits[idx]
    }

    /// True if an existing hit lies strictly within `radius` seconds of `time`.
    pub fn has_neighbour(&self, time: f64, radius: f64) -> bool {
        // Sorted, so only the entries on either side of the insertion point matter.
        let idx = self.hits.partition_point(|h| h.time < time);
        let after = self.hits.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.hits.get(i));
        [before, after]
            .into_iter()
            .flatten()
            .any(|h| (h.time - time).abs() < radius)
    }

    /// Hits with `start <= time < end`.
    pub fn hits_in(&self, start: f64, end: f64) -> &[BassHit] {
        let lo = self.hits.partition_point(|h| h.time < start);
        let hi = self.hits.partition_point(|h| h.time < end);
        &self.hits[lo..hi.max(lo)]
    }

    pub(crate) fn hits_in_mut(&mut self, start: f64, end: f64) -> &mut [BassHit] {
        let lo = self.hits.partition_point(|h| h.time < start);
        let hi = self.hits.partition_point(|h| h.time < end);
        &mut self.hits[lo..hi.max(lo)]
    }

    /// Forget which hits one pass has already fired.
    pub fn reset_consumption(&mut self, pass: EffectPass) {
        for hit in &mut self.hits {
            match pass {
                EffectPass::Live => hit.consumed_by_live = false,
                EffectPass::Export => hit.consumed_by_export = false,
            }
        }
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }
}
