//! Reverberation: FFT convolution of a source with a room impulse
//! response.
//!
//! The output is aligned on the RIR's direct-path peak and trimmed to
//! the source length, then rescaled so the average amplitude matches the
//! dry signal, so reverberating never changes a source's duration or
//! overall level.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Convolve `source` with `rir` and return a buffer of the same length
/// as `source`.
pub fn reverberate(source: &[f64], rir: &[f64]) -> Vec<f64> {
    if source.is_empty() || rir.is_empty() {
        return source.to_vec();
    }

    // Direct-path delay: align output on the RIR's strongest tap
    let peak = rir
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.abs().partial_cmp(&b.abs()).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);

    let full = fft_convolve(source, rir);
    let wet: Vec<f64> = (0..source.len())
        .map(|i| full.get(peak + i).copied().unwrap_or(0.0))
        .collect();

    // Keep the dry signal's average amplitude
    let dry_amp = mean_abs(source);
    let wet_amp = mean_abs(&wet);
    if wet_amp <= f64::EPSILON {
        return wet;
    }
    let gain = dry_amp / wet_amp;
    wet.into_iter().map(|s| s * gain).collect()
}

/// Full linear convolution via a single zero-padded FFT.
fn fft_convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let out_len = a.len() + b.len() - 1;
    let fft_len = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut fa: Vec<Complex<f64>> = a
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();
    let mut fb: Vec<Complex<f64>> = b
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    fft.process(&mut fa);
    fft.process(&mut fb);
    for (x, y) in fa.iter_mut().zip(fb.iter()) {
        *x *= *y;
    }
    ifft.process(&mut fa);

    let scale = 1.0 / fft_len as f64;
    fa.into_iter().take(out_len).map(|c| c.re * scale).collect()
}

fn mean_abs(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f64>() / samples.len() as f64
}
