//! Dynamic mixture generation: the per-request pipeline that turns a
//! speaker pool into randomized multi-speaker mixtures.
//!
//! One `generate` call runs: choose speaker count -> choose speakers ->
//! choose RIR -> load and condition each source -> sort longest-first ->
//! iteratively overlap-mix -> add noise and dither -> peak-normalize ->
//! assemble the record. The engine holds no mutable state across calls;
//! callers on parallel workers each bring their own rng.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::audio::io::{decode, probe_sample_rate, resample};
use crate::audio::loudness::{normalize_loudness, peak_amplitude, LoudnessMeter};
use crate::audio::mix::{mix_sources, pad};
use crate::audio::reverb::reverberate;
use crate::config::MixingConfig;
use crate::error::{Error, Result};
use crate::manifest::{parse_paths, Substitution};
use crate::pool::SpeakerPool;
use crate::record::{MixInfo, MixtureRecord, NUM_SOURCE_SLOTS};

/// Speaker id recorded for silent (zero-speaker) mixtures.
pub const NO_SPEAKER: &str = "no-spkr";

/// Anything indexable by the integer keys stored in the speaker pool.
/// Bound datasets resolve the original records of selected sources into
/// the mixture metadata.
pub trait SourceDataset: Send + Sync {
    fn get(&self, index: usize) -> Option<serde_json::Value>;
}

impl SourceDataset for Vec<serde_json::Value> {
    fn get(&self, index: usize) -> Option<serde_json::Value> {
        self.as_slice().get(index).cloned()
    }
}

/// Intermediate result of [`DynamicMixer::generate`], before the fixed
/// three-slot record is assembled.
#[derive(Debug, Clone)]
pub struct GeneratedMix {
    pub mixture: Vec<f64>,
    /// One padded buffer per mixed source, all the mixture's length.
    pub padded_sources: Vec<Vec<f64>>,
    pub noise: Option<Vec<f64>>,
    pub info: MixInfo,
}

#[derive(Clone)]
struct LoadedSource {
    audio: Vec<f64>,
    index: Option<usize>,
}

pub struct DynamicMixer {
    pool: SpeakerPool,
    config: MixingConfig,
    /// Native rate shared by every file in the pool, probed from the
    /// first file at construction.
    orig_sr: u32,
    meter: Option<LoudnessMeter>,
    noise_files: Vec<PathBuf>,
    rir_files: Vec<PathBuf>,
    dataset: Option<Box<dyn SourceDataset>>,
}

// The bound dataset is an opaque trait object; report its presence only
impl fmt::Debug for DynamicMixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMixer")
            .field("num_speakers", &self.pool.num_speakers())
            .field("config", &self.config)
            .field("orig_sr", &self.orig_sr)
            .field("noise_files", &self.noise_files.len())
            .field("rir_files", &self.rir_files.len())
            .field("dataset", &self.dataset.is_some())
            .finish()
    }
}

impl DynamicMixer {
    /// Build an engine over a speaker pool.
    ///
    /// `noise_flist` / `rir_flist` are manifest paths, required when the
    /// config enables noise or reverberation. The pool must hold at
    /// least `max(num_spkrs)` distinct speakers, and speaker counts
    /// beyond the record's three source slots are rejected.
    pub fn new(
        pool: SpeakerPool,
        config: MixingConfig,
        noise_flist: Option<&Path>,
        rir_flist: Option<&Path>,
        substitutions: &[Substitution],
    ) -> Result<Self> {
        let config = config.validated()?;

        if config.max_num_spkrs() > NUM_SOURCE_SLOTS {
            return Err(Error::ConfigValidation(format!(
                "num_spkrs allows {} speakers but records carry {NUM_SOURCE_SLOTS} source slots",
                config.max_num_spkrs()
            )));
        }
        if pool.num_speakers() < config.max_num_spkrs() {
            return Err(Error::InsufficientSpeakers {
                required: config.max_num_spkrs(),
                available: pool.num_speakers(),
            });
        }

        let orig_sr = probe_sample_rate(&pool.first_file().path)?;
        if orig_sr != config.sample_rate {
            log::warn!(
                "pool native rate {orig_sr} Hz differs from target {} Hz, sources will be resampled",
                config.sample_rate
            );
        }

        let noise_files = match (config.noise_add, noise_flist) {
            (true, Some(list)) => parse_paths(list, substitutions)?,
            (true, None) => {
                return Err(Error::ConfigValidation(
                    "noise_add is set but no noise manifest was given".into(),
                ))
            }
            (false, _) => Vec::new(),
        };
        let rir_files = match (config.rir_add, rir_flist) {
            (true, Some(list)) => parse_paths(list, substitutions)?,
            (true, None) => {
                return Err(Error::ConfigValidation(
                    "rir_add is set but no RIR manifest was given".into(),
                ))
            }
            (false, _) => Vec::new(),
        };

        let meter = config
            .audio_norm
            .then(|| LoudnessMeter::new(config.sample_rate));

        Ok(Self {
            pool,
            config,
            orig_sr,
            meter,
            noise_files,
            rir_files,
            dataset: None,
        })
    }

    /// Build a pool from dataset records and bind the dataset, so every
    /// record's `metadata.data` resolves the selected sources.
    ///
    /// `wav_key` names the audio-path field; with `spkr_key` absent,
    /// every record becomes its own singleton speaker.
    pub fn from_dataset(
        records: Vec<serde_json::Value>,
        wav_key: &str,
        spkr_key: Option<&str>,
        config: MixingConfig,
        noise_flist: Option<&Path>,
        rir_flist: Option<&Path>,
        substitutions: &[Substitution],
    ) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut map: std::collections::HashMap<String, Vec<crate::pool::SourceFile>> =
            std::collections::HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            let path = record
                .get(wav_key)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::ConfigValidation(format!("record {idx} has no \"{wav_key}\" field"))
                })?;
            let speaker = match spkr_key {
                Some(key) => record
                    .get(key)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::ConfigValidation(format!("record {idx} has no \"{key}\" field"))
                    })?
                    .to_string(),
                None => format!("spkr{idx}"),
            };
            if !map.contains_key(&speaker) {
                names.push(speaker.clone());
            }
            map.entry(speaker)
                .or_default()
                .push(crate::pool::SourceFile::new(path, Some(idx)));
        }

        let pool =
            SpeakerPool::from_map(names.into_iter().map(|n| { let files = map.remove(&n).unwrap_or_default(); (n, files) }))?;
        let mut mixer = Self::new(pool, config, noise_flist, rir_flist, substitutions)?;
        mixer.set_dataset(Box::new(records));
        Ok(mixer)
    }

    /// Attach an indexable dataset after construction.
    pub fn set_dataset(&mut self, dataset: Box<dyn SourceDataset>) {
        self.dataset = Some(dataset);
    }

    pub fn pool(&self) -> &SpeakerPool {
        &self.pool
    }

    pub fn config(&self) -> &MixingConfig {
        &self.config
    }

    /// Total file count across the pool, the nominal epoch length.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Generate one fresh mixture. Nothing is cached or reused; every
    /// random decision comes from `rng`.
    pub fn generate(&self, rng: &mut StdRng) -> Result<GeneratedMix> {
        let mut info = MixInfo::default();

        info.num_spkrs = weighted_choice(&self.config.num_spkrs, &self.config.num_spkrs_prob, rng);

        if info.num_spkrs == 0 {
            // Silent mixture: a random-length zero buffer straight to
            // post-processing
            let length = rng.gen_range(self.config.min_source_len..=self.config.max_source_len);
            let silence = vec![0.0; length];
            let (mixture, padded_sources, noise) =
                self.postprocess(silence.clone(), vec![silence], &mut info, rng)?;
            info.speakers.push(NO_SPEAKER.to_string());
            return Ok(GeneratedMix { mixture, padded_sources, noise, info });
        }

        info.speakers = self.pool.sample_speakers(info.num_spkrs, rng)?;

        // One RIR shared by all sources of the mixture
        let mut rir: Option<Vec<f64>> = None;
        if self.config.rir_add && rng.gen::<f64>() < self.config.rir_prob {
            let path = self.rir_files[rng.gen_range(0..self.rir_files.len())].clone();
            let (audio, fs) = decode(&path)?;
            if fs != self.orig_sr {
                return Err(Error::audio(
                    &path,
                    format!("expected {} Hz, found {fs} Hz", self.orig_sr),
                ));
            }
            rir = Some(resample(&audio, fs, self.config.sample_rate)?);
            info.rir = Some(path);
        }

        let mut sources: Vec<LoadedSource> = Vec::with_capacity(info.num_spkrs);
        for speaker in info.speakers.clone() {
            let file = self.pool.random_file(&speaker, rng)?;
            let path = file.path.clone();
            let index = file.index;
            info.sources.push(path.clone());
            let audio = self.prepare_source(&path, rir.as_deref(), false, &mut info, rng)?;
            sources.push(LoadedSource { audio, index });
        }

        // Longest source first; metadata rows follow the same order
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by(|&i, &j| sources[j].audio.len().cmp(&sources[i].audio.len()));
        let sources: Vec<LoadedSource> = order.iter().map(|&i| sources[i].clone()).collect();
        info.sources = order.iter().map(|&i| info.sources[i].clone()).collect();
        info.source_lengths = order.iter().map(|&i| info.source_lengths[i]).collect();

        let mut mixture = sources[0].audio.clone();
        let mut padded_sources: Vec<Vec<f64>> = vec![sources[0].audio.clone()];
        for source in &sources[1..] {
            let ratio =
                weighted_choice(&self.config.overlap_ratio, &self.config.overlap_prob, rng);
            let overlap_samples = (source.audio.len() as f64 * ratio) as i64;

            let out = mix_sources(&source.audio, &mixture, overlap_samples, rng);
            info.overlap_ratios_paddings.push((ratio, out.paddings));

            // The running mixture's padding re-aligns every source mixed
            // so far; afterwards all buffers share the new total length
            let mixture_padding = out.paddings[1];
            for prev in padded_sources.iter_mut() {
                *prev = pad(prev, mixture_padding);
            }
            let [padded_new, _] = out.padded;
            padded_sources.push(padded_new);
            mixture = out.mixture;
        }

        let (mixture, padded_sources, noise) =
            self.postprocess(mixture, padded_sources, &mut info, rng)?;

        if let Some(dataset) = &self.dataset {
            info.data = sources
                .iter()
                .filter_map(|s| s.index)
                .filter_map(|idx| dataset.get(idx))
                .collect();
        }

        Ok(GeneratedMix { mixture, padded_sources, noise, info })
    }

    /// Generate a finished record with exactly three source slots.
    ///
    /// `index` only feeds the id string; it does not seed the rng. When
    /// absent, a random UUID stands in for it.
    pub fn get_item(&self, index: Option<usize>, rng: &mut StdRng) -> Result<MixtureRecord> {
        let generated = self.generate(rng)?;
        let GeneratedMix { mixture, mut padded_sources, noise, info } = generated;

        while padded_sources.len() < NUM_SOURCE_SLOTS {
            padded_sources.push(vec![0.0; mixture.len()]);
        }
        let mut slots = padded_sources.into_iter();
        let sources = [
            slots.next().unwrap_or_default(),
            slots.next().unwrap_or_default(),
            slots.next().unwrap_or_default(),
        ];

        let idx_tag = match index {
            Some(i) => i.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let id = format!(
            "{idx_tag}_{}_overlap{}",
            info.speakers.join("-"),
            info.overlap_tag()
        );

        let noise = noise.unwrap_or_else(|| vec![0.0; mixture.len()]);
        Ok(MixtureRecord { id, mixture, sources, noise, metadata: info })
    }

    /// Load one source and run the conditioning chain: rate check,
    /// resample, truncate (sources only), loudness-normalize,
    /// reverberate (sources only).
    fn prepare_source(
        &self,
        path: &Path,
        rir: Option<&[f64]>,
        is_noise: bool,
        info: &mut MixInfo,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let (audio, fs) = decode(path)?;
        if fs != self.orig_sr {
            return Err(Error::audio(
                path,
                format!("expected {} Hz, found {fs} Hz", self.orig_sr),
            ));
        }
        let mut audio = resample(&audio, fs, self.config.sample_rate)?;

        if !is_noise {
            // Noise is later tiled to the mixture length instead
            let length = rng.gen_range(self.config.min_source_len..=self.config.max_source_len);
            audio.truncate(length);
            info.source_lengths.push(length);
        }

        if let Some(meter) = &self.meter {
            let loudness = if is_noise {
                let l = uniform_between(
                    self.config.noise_min_loudness,
                    self.config.noise_max_loudness,
                    rng,
                );
                info.noise_loudness = Some(l);
                l
            } else {
                let l = uniform_between(
                    self.config.audio_min_loudness,
                    self.config.audio_max_loudness,
                    rng,
                );
                info.source_loudness.push(l);
                l
            };
            audio = normalize_loudness(&audio, meter, loudness, self.config.audio_max_amp);
        }

        if !is_noise {
            if let Some(rir) = rir {
                audio = reverberate(&audio, rir);
            }
        }

        Ok(audio)
    }

    /// Noise, dither, and the shared-gain peak ceiling.
    fn postprocess(
        &self,
        mut mixture: Vec<f64>,
        mut sources: Vec<Vec<f64>>,
        info: &mut MixInfo,
        rng: &mut StdRng,
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>, Option<Vec<f64>>)> {
        let mut noise: Option<Vec<f64>> = None;
        if self.config.noise_add && rng.gen::<f64>() < self.config.noise_prob {
            let path = self.noise_files[rng.gen_range(0..self.noise_files.len())].clone();
            info.noise = Some(path.clone());
            let raw = self.prepare_source(&path, None, true, info, rng)?;

            // Tile the noise across the full mixture
            let mut tiled = Vec::with_capacity(mixture.len());
            while tiled.len() < mixture.len() {
                tiled.extend_from_slice(&raw);
            }
            tiled.truncate(mixture.len());

            for (m, n) in mixture.iter_mut().zip(tiled.iter()) {
                *m += n;
            }
            noise = Some(tiled);
        }

        if self.config.white_noise_add {
            let dither = Normal::new(self.config.white_noise_mu, self.config.white_noise_var)
                .map_err(|e| Error::ConfigValidation(format!("white noise params: {e}")))?;
            for m in mixture.iter_mut() {
                *m += dither.sample(rng);
            }
        }

        // Final step: one shared gain keeps relative amplitudes intact
        let peak = peak_amplitude(&mixture);
        if peak > self.config.audio_max_amp {
            let gain = self.config.audio_max_amp / peak;
            for m in mixture.iter_mut() {
                *m *= gain;
            }
            for source in sources.iter_mut() {
                for s in source.iter_mut() {
                    *s *= gain;
                }
            }
            if let Some(noise) = noise.as_mut() {
                for n in noise.iter_mut() {
                    *n *= gain;
                }
            }
        }

        info.duration = mixture.len() as f64 / self.config.sample_rate as f64;
        Ok((mixture, sources, noise))
    }
}

/// Resumable sequential generation over an engine.
///
/// Each item's rng is derived from the iterator seed and the item
/// position, so saving `position()` and later resuming from it replays
/// the exact remaining sequence.
pub struct MixtureIter<'a> {
    mixer: &'a DynamicMixer,
    seed: u64,
    position: usize,
}

impl<'a> MixtureIter<'a> {
    pub fn new(mixer: &'a DynamicMixer, seed: u64) -> Self {
        Self { mixer, seed, position: 0 }
    }

    pub fn resume(mixer: &'a DynamicMixer, seed: u64, position: usize) -> Self {
        Self { mixer, seed, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn item_rng(&self, position: usize) -> StdRng {
        // splitmix-style spread so adjacent positions decorrelate
        let stream = (position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ stream)
    }
}

impl Iterator for MixtureIter<'_> {
    type Item = crate::error::Result<MixtureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rng = self.item_rng(self.position);
        let item = self.mixer.get_item(Some(self.position), &mut rng);
        self.position += 1;
        Some(item)
    }
}

/// Weighted draw over parallel value/weight slices.
fn weighted_choice<T: Copy>(values: &[T], weights: &[f64], rng: &mut StdRng) -> T {
    let total: f64 = weights.iter().sum();
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (value, &w) in values.iter().zip(weights.iter()) {
        cumulative += w;
        if r <= cumulative {
            return *value;
        }
    }
    *values.last().expect("weighted_choice over empty values")
}

/// Uniform sample between two bounds given in either order.
fn uniform_between(a: f64, b: f64, rng: &mut StdRng) -> f64 {
    a + (b - a) * rng.gen::<f64>()
}
