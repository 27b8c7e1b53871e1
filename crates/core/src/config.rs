//! Mixture generation configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const PROB_SUM_TOLERANCE: f64 = 1e-6;

/// Configuration for the dynamic mixing engine.
///
/// Immutable once validated. Probability lists are parallel to their
/// value lists; omitted lists default to uniform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingConfig {
    /// Allowed speaker counts per mixture (0 produces a silent mixture).
    pub num_spkrs: Vec<usize>,
    /// Sampling weights parallel to `num_spkrs`; empty = uniform.
    pub num_spkrs_prob: Vec<f64>,
    /// Allowed overlap fractions of the shorter source. Negative values
    /// insert silence between the sources instead of overlapping.
    pub overlap_ratio: Vec<f64>,
    /// Sampling weights parallel to `overlap_ratio`; empty = uniform.
    pub overlap_prob: Vec<f64>,
    /// Normalize per-source loudness before mixing.
    pub audio_norm: bool,
    /// Source loudness band in dB LUFS, sampled uniformly.
    pub audio_min_loudness: f64,
    pub audio_max_loudness: f64,
    /// Peak amplitude ceiling for the mixture and all sources.
    pub audio_max_amp: f64,
    pub noise_add: bool,
    pub noise_prob: f64,
    /// Noise loudness band in dB LUFS.
    pub noise_min_loudness: f64,
    pub noise_max_loudness: f64,
    /// Gaussian dither added to the mixture so digital silence never
    /// reaches the consumer.
    pub white_noise_add: bool,
    pub white_noise_mu: f64,
    pub white_noise_var: f64,
    pub rir_add: bool,
    pub rir_prob: f64,
    /// Target sample rate of all generated buffers.
    pub sample_rate: u32,
    /// Per-source truncation bounds, in samples at `sample_rate`.
    pub min_source_len: usize,
    pub max_source_len: usize,
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            num_spkrs: vec![2],
            num_spkrs_prob: Vec::new(),
            overlap_ratio: vec![1.0],
            overlap_prob: Vec::new(),
            audio_norm: true,
            audio_min_loudness: -33.0,
            audio_max_loudness: -25.0,
            audio_max_amp: 0.9,
            noise_add: false,
            noise_prob: 1.0,
            noise_min_loudness: -33.0,
            noise_max_loudness: -43.0,
            white_noise_add: true,
            white_noise_mu: 0.0,
            white_noise_var: 1e-7,
            rir_add: false,
            rir_prob: 1.0,
            sample_rate: 16000,
            min_source_len: 16000,
            max_source_len: 320000,
        }
    }
}

impl MixingConfig {
    /// Fill in uniform probability lists and check the invariants.
    ///
    /// Returns the validated config so construction reads as
    /// `MixingConfig { .. }.validated()?`.
    pub fn validated(mut self) -> Result<Self> {
        if self.num_spkrs.is_empty() {
            return Err(Error::ConfigValidation("num_spkrs is empty".into()));
        }
        if self.overlap_ratio.is_empty() {
            return Err(Error::ConfigValidation("overlap_ratio is empty".into()));
        }

        if self.num_spkrs_prob.is_empty() {
            self.num_spkrs_prob = uniform(self.num_spkrs.len());
        }
        if self.overlap_prob.is_empty() {
            self.overlap_prob = uniform(self.overlap_ratio.len());
        }

        check_weights("num_spkrs", self.num_spkrs.len(), &self.num_spkrs_prob)?;
        check_weights("overlap_ratio", self.overlap_ratio.len(), &self.overlap_prob)?;

        if !(0.0..1.0).contains(&self.audio_max_amp) {
            return Err(Error::ConfigValidation(format!(
                "audio_max_amp {} outside [0, 1)",
                self.audio_max_amp
            )));
        }
        if self.min_source_len > self.max_source_len {
            return Err(Error::ConfigValidation(format!(
                "min_source_len {} > max_source_len {}",
                self.min_source_len, self.max_source_len
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::ConfigValidation("sample_rate is 0".into()));
        }

        Ok(self)
    }

    /// Largest speaker count the config can ever request.
    pub fn max_num_spkrs(&self) -> usize {
        self.num_spkrs.iter().copied().max().unwrap_or(0)
    }
}

fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn check_weights(name: &str, expected_len: usize, weights: &[f64]) -> Result<()> {
    if weights.len() != expected_len {
        return Err(Error::ConfigValidation(format!(
            "{name} has {expected_len} entries but its probability list has {}",
            weights.len()
        )));
    }
    if weights.iter().any(|&w| w < 0.0) {
        return Err(Error::ConfigValidation(format!(
            "{name} probabilities contain a negative weight"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
        return Err(Error::ConfigValidation(format!(
            "{name} probabilities sum to {sum}, expected 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        let config = MixingConfig::default().validated().unwrap();
        assert_eq!(config.num_spkrs_prob, vec![1.0]);
        assert_eq!(config.overlap_prob, vec![1.0]);
    }

    #[test]
    fn test_uniform_fill() {
        let config = MixingConfig {
            num_spkrs: vec![1, 2, 3],
            overlap_ratio: vec![0.0, 0.25, 0.5, 1.0],
            ..Default::default()
        }
        .validated()
        .unwrap();

        assert_eq!(config.num_spkrs_prob.len(), 3);
        assert_eq!(config.overlap_prob.len(), 4);
        let sum: f64 = config.num_spkrs_prob.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let sum: f64 = config.overlap_prob.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = MixingConfig {
            num_spkrs: vec![1, 2],
            num_spkrs_prob: vec![1.0],
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));

        let err = MixingConfig {
            overlap_ratio: vec![0.5, 1.0],
            overlap_prob: vec![0.2, 0.2, 0.6],
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn test_probs_must_sum_to_one() {
        let err = MixingConfig {
            num_spkrs: vec![1, 2],
            num_spkrs_prob: vec![0.5, 0.4],
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = MixingConfig {
            num_spkrs: vec![1, 2],
            num_spkrs_prob: vec![1.5, -0.5],
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn test_bad_amp_and_lengths_rejected() {
        let err = MixingConfig {
            audio_max_amp: 1.0,
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));

        let err = MixingConfig {
            min_source_len: 100,
            max_source_len: 10,
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn test_max_num_spkrs() {
        let config = MixingConfig {
            num_spkrs: vec![0, 3, 1],
            ..Default::default()
        };
        assert_eq!(config.max_num_spkrs(), 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MixingConfig::default().validated().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: MixingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_spkrs, config.num_spkrs);
        assert_eq!(back.sample_rate, config.sample_rate);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MixingConfig =
            serde_json::from_str(r#"{"num_spkrs": [1, 2, 3], "noise_add": true}"#).unwrap();
        let config = config.validated().unwrap();
        assert_eq!(config.num_spkrs, vec![1, 2, 3]);
        assert!(config.noise_add);
        assert_eq!(config.sample_rate, 16000);
    }
}
