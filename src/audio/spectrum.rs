use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use super::decode::AudioData;
use super::filter::LowPass;
use crate::config::AnalyserConfig;

/// One poll's worth of byte-scaled bin magnitudes.
///
/// Bin `i` covers `i * (nyquist / len)` Hz upward.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencySnapshot {
    bins: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }
}

/// Source of frequency snapshots positioned at a media time.
pub trait SpectralSampler {
    fn poll(&mut self, time: f64) -> FrequencySnapshot;
    fn sample_rate(&self) -> u32;
    fn band_count(&self) -> usize;
    /// Drop temporal smoothing state before a new pass.
    fn reset(&mut self) {}
}

/// Low-pass filter followed by a windowed FFT analyser with byte output.
///
/// Output follows the usual analyser-node conventions: Blackman window,
/// magnitudes scaled by `1/fft_size`, exponential smoothing across polls,
/// then dB mapped linearly from `[min_db, max_db]` onto 0-255.
pub struct AnalyserSampler {
    samples: Vec<f32>,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl AnalyserSampler {
    pub fn new(audio: AudioData, config: &AnalyserConfig) -> Self {
        let fft_size = config.fft_size.max(32).next_power_of_two();
        if fft_size != config.fft_size {
            log::warn!("fft_size {} adjusted to {}", config.fft_size, fft_size);
        }

        let AudioData {
            mut samples,
            sample_rate,
        } = audio;
        LowPass::new(config.lowpass_hz, sample_rate, std::f32::consts::FRAC_1_SQRT_2)
            .process_buffer(&mut samples);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        log::info!(
            "Analyser: {} bins, {:.1} Hz/bin, low-pass {:.0} Hz",
            fft_size / 2,
            sample_rate as f32 / fft_size as f32,
            config.lowpass_hz
        );

        Self {
            samples,
            sample_rate,
            fft,
            window: blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_db: config.min_db,
            max_db: config.max_db,
        }
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let range = (self.max_db - self.min_db).max(f32::EPSILON);
        let scaled = 255.0 / range * (db - self.min_db);
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl SpectralSampler for AnalyserSampler {
    fn poll(&mut self, time: f64) -> FrequencySnapshot {
        let fft_size = self.window.len();
        // The window ends at the playback position; zero-padded before the start.
        let end = (time.max(0.0) * self.sample_rate as f64) as usize;
        let end = end.min(self.samples.len());
        let start = end.saturating_sub(fft_size);
        let offset = fft_size - (end - start);

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < offset { 0.0 } else { self.samples[start + i - offset] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let tau = self.smoothing;
        let scale = 1.0 / fft_size as f32;
        for (k, value) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * scale;
            *value = tau * *value + (1.0 - tau) * magnitude;
        }

        let bins = self.smoothed.iter().map(|&m| self.to_byte(m)).collect();
        FrequencySnapshot::new(bins)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn band_count(&self) -> usize {
        self.smoothed.len()
    }

    fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Loud bass inside the given `[start, end)` spans, silence elsewhere.
#[cfg(test)]
pub(crate) struct PulseSampler {
    pulses: Vec<(f64, f64)>,
    level: u8,
}

#[cfg(test)]
impl PulseSampler {
    pub const SAMPLE_RATE: u32 = 48_000;
    pub const BANDS: usize = 1024;

    pub fn new(pulses: &[(f64, f64)]) -> Self {
        Self {
            pulses: pulses.to_vec(),
            level: 200,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }
}

#[cfg(test)]
impl SpectralSampler for PulseSampler {
    fn poll(&mut self, time: f64) -> FrequencySnapshot {
        if self.pulses.iter().any(|&(start, end)| time >= start && time < end) {
            crate::detect::energy::bass_snapshot(self.level, Self::BANDS, Self::SAMPLE_RATE)
        } else {
            FrequencySnapshot::new(vec![0; Self::BANDS])
        }
    }

    fn sample_rate(&self) -> u32 {
        Self::SAMPLE_RATE
    }

    fn band_count(&self) -> usize {
        Self::BANDS
    }
}
