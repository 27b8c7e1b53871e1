//! Integrated loudness measurement (ITU-R BS.1770) and normalization.
//!
//! Mono-only: K-weighting prefilter (high shelf + high pass biquads)
//! followed by 400 ms gated blocks with 75% overlap, absolute gate at
//! -70 LUFS and relative gate 10 LU below the first-pass level.

/// Offset that calibrates K-weighted power to LUFS.
const LOUDNESS_OFFSET: f64 = -0.691;
/// Absolute gate threshold.
const ABSOLUTE_GATE: f64 = -70.0;
/// Gating block length in seconds.
const BLOCK_SECS: f64 = 0.4;
/// Block step: 75% overlap.
const STEP_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// High-shelf from the BS.1770 parametric spec.
    fn high_shelf(fs: f64, fc: f64, q: f64, gain_db: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = std::f64::consts::TAU * fc / fs;
        let alpha = w0.sin() / (2.0 * q);
        let (cos_w0, sqrt_a) = (w0.cos(), a.sqrt());

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha;

        Self { b0: b0 / a0, b1: b1 / a0, b2: b2 / a0, a1: a1 / a0, a2: a2 / a0 }
    }

    fn high_pass(fs: f64, fc: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * fc / fs;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self { b0: b0 / a0, b1: b1 / a0, b2: b2 / a0, a1: a1 / a0, a2: a2 / a0 }
    }

    /// Direct form II transposed.
    fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut z1 = 0.0;
        let mut z2 = 0.0;
        input
            .iter()
            .map(|&x| {
                let y = self.b0 * x + z1;
                z1 = self.b1 * x - self.a1 * y + z2;
                z2 = self.b2 * x - self.a2 * y;
                y
            })
            .collect()
    }
}

/// K-weighted integrated loudness meter for one sample rate.
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    sample_rate: u32,
    shelf: Biquad,
    highpass: Biquad,
}

impl LoudnessMeter {
    pub fn new(sample_rate: u32) -> Self {
        let fs = sample_rate as f64;
        Self {
            sample_rate,
            // BS.1770-4 prefilter parameters
            shelf: Biquad::high_shelf(fs, 1681.974450955533, 0.7071752369554196, 3.999843853973347),
            highpass: Biquad::high_pass(fs, 38.13547087602444, 0.5003270373238773),
        }
    }

    /// Integrated loudness in LUFS. Returns `NEG_INFINITY` for silence.
    ///
    /// Buffers shorter than one 400 ms gating block fall back to the
    /// ungated K-weighted power of the whole buffer.
    pub fn integrated_loudness(&self, samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NEG_INFINITY;
        }

        let weighted = self.highpass.filter(&self.shelf.filter(samples));

        let block = (BLOCK_SECS * self.sample_rate as f64).round() as usize;
        let step = (STEP_SECS * self.sample_rate as f64).round() as usize;

        if weighted.len() < block {
            return LOUDNESS_OFFSET + 10.0 * mean_square(&weighted).log10();
        }

        let mut powers = Vec::new();
        let mut start = 0;
        while start + block <= weighted.len() {
            powers.push(mean_square(&weighted[start..start + block]));
            start += step;
        }

        // Absolute gate
        let above_abs: Vec<f64> = powers
            .iter()
            .copied()
            .filter(|&p| LOUDNESS_OFFSET + 10.0 * p.log10() > ABSOLUTE_GATE)
            .collect();
        if above_abs.is_empty() {
            return f64::NEG_INFINITY;
        }

        // Relative gate, 10 LU below the first-pass level
        let first_pass = LOUDNESS_OFFSET + 10.0 * mean(&above_abs).log10();
        let relative_gate = first_pass - 10.0;
        let gated: Vec<f64> = above_abs
            .into_iter()
            .filter(|&p| LOUDNESS_OFFSET + 10.0 * p.log10() > relative_gate)
            .collect();
        if gated.is_empty() {
            return f64::NEG_INFINITY;
        }

        LOUDNESS_OFFSET + 10.0 * mean(&gated).log10()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Rescale `samples` so their integrated loudness hits `target_lufs`.
///
/// If the gain would push the peak to or past full scale, the result is
/// pulled back to `max_amp` peak instead. Silent input is returned
/// unchanged.
pub fn normalize_loudness(
    samples: &[f64],
    meter: &LoudnessMeter,
    target_lufs: f64,
    max_amp: f64,
) -> Vec<f64> {
    let measured = meter.integrated_loudness(samples);
    if !measured.is_finite() {
        return samples.to_vec();
    }

    let gain = 10f64.powf((target_lufs - measured) / 20.0);
    let mut out: Vec<f64> = samples.iter().map(|&s| s * gain).collect();

    let peak = peak_amplitude(&out);
    if peak >= 1.0 {
        let rescue = max_amp / peak;
        for s in out.iter_mut() {
            *s *= rescue;
        }
    }
    out
}

/// Largest absolute sample value.
pub fn peak_amplitude(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |m, &s| m.max(s.abs()))
}

fn mean_square(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
