use crate::audio::spectrum::FrequencySnapshot;
use crate::config::{BASS_FREQ_MAX, BASS_FREQ_MIN};

/// Mean bin value over the bass band, on the snapshot's 0-255 scale.
///
/// Returns 0 when the band collapses to fewer than two bins at this
/// resolution.
pub fn estimate(snapshot: &FrequencySnapshot, sample_rate: u32) -> f64 {
    let bins = snapshot.bins();
    let n = bins.len();
    if n == 0 || sample_rate == 0 {
        return 0.0;
    }

    let nyquist = sample_rate as f64 / 2.0;
    let bin_hz = nyquist / n as f64;
    let last = (n - 1) as f64;
    let min_bin = (BASS_FREQ_MIN / bin_hz).floor().clamp(0.0, last) as usize;
    let max_bin = (BASS_FREQ_MAX / bin_hz).ceil().clamp(0.0, last) as usize;

    if max_bin <= min_bin {
        return 0.0;
    }

    let sum: u32 = bins[min_bin..=max_bin].iter().map(|&b| b as u32).sum();
    sum as f64 / (max_bin - min_bin + 1) as f64
}

/// Bins covering 20-140 Hz set to `value`, everything else 0.
#[cfg(test)]
pub(crate) fn bass_snapshot(value: u8, n: usize, sample_rate: u32) -> FrequencySnapshot {
    let bin_hz = sample_rate as f64 / 2.0 / n as f64;
    let min_bin = (BASS_FREQ_MIN / bin_hz).floor() as usize;
    let max_bin = ((BASS_FREQ_MAX / bin_hz).ceil() as usize).min(n - 1);
    let bins = (0..n)
        .map(|i| if (min_bin..=max_bin).contains(&i) { value } else { 0 })
        .collect();
    FrequencySnapshot::new(bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_band_value_is_the_mean() {
        let snapshot = bass_snapshot(200, 1024, 48_000);
        assert_relative_eq!(estimate(&snapshot, 48_000), 200.0);
    }

    #[test]
    fn mean_over_inclusive_band() {
        // 44.1 kHz, 1024 bins: ~21.5 Hz per bin, band = bins 0..=7
        let mut bins = vec![0u8; 1024];
        bins[0] = 80;
        bins[7] = 160;
        bins[8] = 255;
        let energy = estimate(&FrequencySnapshot::new(bins), 44_100);
        assert_relative_eq!(energy, 240.0 / 8.0);
    }

    #[test]
    fn degenerate_band_is_zero() {
        // One bin: min and max both clamp to 0.
        assert_eq!(estimate(&FrequencySnapshot::new(vec![255]), 48_000), 0.0);
        assert_eq!(estimate(&FrequencySnapshot::new(Vec::new()), 48_000), 0.0);
    }

    #[test]
    fn band_above_nyquist_is_zero() {
        // 30 Hz sampling: the whole band is above nyquist, both ends clamp to N-1.
        let snapshot = FrequencySnapshot::new(vec![255; 16]);
        assert_eq!(estimate(&snapshot, 30), 0.0);
    }
}
