use std::f32::consts::PI;

/// Second-order low-pass (RBJ cookbook), direct form I.
#[derive(Clone, Debug)]
pub struct LowPass {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl LowPass {
    pub fn new(cutoff_hz: f32, sample_rate: u32, q: f32) -> Self {
        // Keep the cutoff strictly inside (0, nyquist).
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = cutoff_hz.clamp(1.0, nyquist * 0.99);
        let w0 = 2.0 * PI * cutoff / sample_rate as f32;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn process_buffer(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    #[test]
    fn passes_bass_and_cuts_treble() {
        let sr = 48_000;
        let mut low = sine(60.0, sr, sr as usize);
        let mut high = sine(4_000.0, sr, sr as usize);

        LowPass::new(200.0, sr, std::f32::consts::FRAC_1_SQRT_2).process_buffer(&mut low);
        LowPass::new(200.0, sr, std::f32::consts::FRAC_1_SQRT_2).process_buffer(&mut high);

        // Skip the settling transient
        let tail = sr as usize / 2;
        assert!(peak(&low[tail..]) > 0.8);
        assert!(peak(&high[tail..]) < 0.01);
    }

    #[test]
    fn cutoff_above_nyquist_is_clamped() {
        let mut filter = LowPass::new(100_000.0, 8_000, 0.707);
        let out: Vec<f32> = (0..1000).map(|_| filter.process(1.0)).collect();
        assert!(out.iter().all(|v| v.is_finite()));
        assert!((out[999] - 1.0).abs() < 1e-3);
    }
}
