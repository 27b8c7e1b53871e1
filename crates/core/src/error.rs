//! Error types for the mixing engine.

use std::path::PathBuf;

/// Errors produced while building a pool or generating a mixture.
///
/// All variants are raised synchronously at the point of detection and
/// never retried internally; a failing request leaves the pool and
/// config untouched for subsequent requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file-list manifest was unreadable or contained no paths.
    #[error("manifest {path}: {reason}")]
    ManifestFormat { path: PathBuf, reason: String },

    /// `MixingConfig` field lists are inconsistent.
    #[error("invalid mixing config: {0}")]
    ConfigValidation(String),

    /// The pool holds fewer distinct speakers than the config can request.
    #[error("expected at least {required} speakers, pool has {available}")]
    InsufficientSpeakers { required: usize, available: usize },

    /// A per-request speaker draw asked for more speakers than exist.
    #[error("cannot sample {requested} distinct speakers from {available}")]
    SpeakerSampling { requested: usize, available: usize },

    /// An audio file could not be read, or its native rate does not match
    /// the pool's fixed original rate.
    #[error("audio load failed for {path}: {reason}")]
    AudioLoad { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Resample(#[from] rubato::ResamplerConstructionError),

    #[error(transparent)]
    ResampleProcess(#[from] rubato::ResampleError),
}

impl Error {
    pub(crate) fn audio(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::AudioLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
