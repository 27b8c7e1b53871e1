//! dynmix-core: dynamic speech-mixture generation.
//!
//! Builds randomized multi-speaker audio mixtures from a pool of
//! single-talker recordings: weighted speaker selection, loudness
//! normalization, controlled overlap mixing, optional reverberation and
//! background noise, and a peak-ceiling post-process. Output records
//! carry the mixture, three fixed source slots, the noise buffer, and
//! full generation metadata.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod pool;
pub mod record;

pub use config::MixingConfig;
pub use engine::{DynamicMixer, GeneratedMix, MixtureIter, SourceDataset, NO_SPEAKER};
pub use error::{Error, Result};
pub use manifest::{parse_paths, Substitution};
pub use pool::{SourceFile, SpeakerPool};
pub use record::{collate, Batch, MixInfo, MixtureRecord, NUM_SOURCE_SLOTS};
