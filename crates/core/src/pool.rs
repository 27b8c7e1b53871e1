//! Speaker source pool: speaker ids mapped to their audio files, with
//! sampling weights proportional to each speaker's file count.

use std::collections::HashMap;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Error, Result};

/// One audio file belonging to a speaker, with the index of the backing
/// dataset record it came from (if any).
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub index: Option<usize>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, index: Option<usize>) -> Self {
        Self { path: path.into(), index }
    }
}

/// Read-only after construction; safe to share across worker threads as
/// long as each worker brings its own rng.
#[derive(Debug, Clone)]
pub struct SpeakerPool {
    names: Vec<String>,
    files: HashMap<String, Vec<SourceFile>>,
    weights: Vec<f64>,
}

impl SpeakerPool {
    /// Build from a speaker → files mapping, preserving iteration order.
    pub fn from_map(map: impl IntoIterator<Item = (String, Vec<SourceFile>)>) -> Result<Self> {
        let mut names = Vec::new();
        let mut files = HashMap::new();
        for (name, spkr_files) in map {
            if spkr_files.is_empty() {
                return Err(Error::ConfigValidation(format!(
                    "speaker {name} has no files"
                )));
            }
            names.push(name.clone());
            files.insert(name, spkr_files);
        }
        if names.is_empty() {
            return Err(Error::ConfigValidation("speaker pool is empty".into()));
        }

        let total: usize = files.values().map(Vec::len).sum();
        let weights = names
            .iter()
            .map(|n| files[n].len() as f64 / total as f64)
            .collect();

        Ok(Self { names, files, weights })
    }

    /// Build from a flat file list: every file becomes its own singleton
    /// speaker (`spkr0`, `spkr1`, ...), with no dataset index.
    pub fn from_files(paths: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        Self::from_map(
            paths
                .into_iter()
                .enumerate()
                .map(|(i, p)| (format!("spkr{i}"), vec![SourceFile::new(p, None)])),
        )
    }

    pub fn num_speakers(&self) -> usize {
        self.names.len()
    }

    /// Total file count across all speakers.
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn speaker_names(&self) -> &[String] {
        &self.names
    }

    /// Any one file, used to probe the pool's native sample rate.
    pub fn first_file(&self) -> &SourceFile {
        &self.files[&self.names[0]][0]
    }

    /// Draw `k` distinct speakers without replacement, weighted by file
    /// count. Returned in draw order.
    pub fn sample_speakers(&self, k: usize, rng: &mut StdRng) -> Result<Vec<String>> {
        if k > self.names.len() {
            return Err(Error::SpeakerSampling {
                requested: k,
                available: self.names.len(),
            });
        }

        let mut candidates: Vec<usize> = (0..self.names.len()).collect();
        let mut remaining: Vec<f64> = self.weights.clone();
        let mut chosen = Vec::with_capacity(k);

        for _ in 0..k {
            let total: f64 = remaining.iter().sum();
            let r: f64 = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = candidates.len() - 1;
            for (slot, &w) in remaining.iter().enumerate() {
                cumulative += w;
                if r <= cumulative {
                    pick = slot;
                    break;
                }
            }
            chosen.push(self.names[candidates[pick]].clone());
            candidates.remove(pick);
            remaining.remove(pick);
        }

        Ok(chosen)
    }

    /// Pick one of a speaker's files uniformly at random.
    pub fn random_file(&self, speaker: &str, rng: &mut StdRng) -> Result<&SourceFile> {
        let files = self.files.get(speaker).ok_or(Error::SpeakerSampling {
            requested: 1,
            available: 0,
        })?;
        Ok(&files[rng.gen_range(0..files.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn pool_two_speakers() -> SpeakerPool {
        SpeakerPool::from_map([
            (
                "alice".to_string(),
                vec![SourceFile::new("/a/1.wav", Some(0))],
            ),
            (
                "bob".to_string(),
                vec![
                    SourceFile::new("/b/1.wav", Some(1)),
                    SourceFile::new("/b/2.wav", Some(2)),
                    SourceFile::new("/b/3.wav", Some(3)),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_weights_proportional_to_file_count() {
        let pool = pool_two_speakers();
        assert_eq!(pool.len(), 4);
        assert!((pool.weights[0] - 0.25).abs() < 1e-12);
        assert!((pool.weights[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_from_files_singleton_speakers() {
        let pool = SpeakerPool::from_files(
            ["/x/1.wav", "/x/2.wav"].map(PathBuf::from),
        )
        .unwrap();
        assert_eq!(pool.num_speakers(), 2);
        assert_eq!(pool.speaker_names(), ["spkr0", "spkr1"]);
        assert!(pool.first_file().index.is_none());
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(SpeakerPool::from_files(Vec::new()).is_err());
        assert!(SpeakerPool::from_map([("a".to_string(), vec![])]).is_err());
    }

    #[test]
    fn test_sample_distinct() {
        let pool = pool_two_speakers();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let spkrs = pool.sample_speakers(2, &mut rng).unwrap();
            assert_eq!(spkrs.len(), 2);
            assert_ne!(spkrs[0], spkrs[1]);
        }
    }

    #[test]
    fn test_sample_too_many_fails() {
        let pool = pool_two_speakers();
        let mut rng = StdRng::seed_from_u64(7);
        let err = pool.sample_speakers(3, &mut rng).unwrap_err();
        assert!(matches!(err, Error::SpeakerSampling { requested: 3, available: 2 }));
    }

    #[test]
    fn test_weighted_sampling_favors_larger_speaker() {
        // bob has 3 files to alice's 1 and should win roughly 3x as often
        let pool = pool_two_speakers();
        let mut rng = StdRng::seed_from_u64(42);
        let mut bob = 0usize;
        let trials = 10_000;
        for _ in 0..trials {
            let spkrs = pool.sample_speakers(1, &mut rng).unwrap();
            if spkrs[0] == "bob" {
                bob += 1;
            }
        }
        let frac = bob as f64 / trials as f64;
        assert!(
            (frac - 0.75).abs() < 0.03,
            "bob selected {frac} of the time, expected ~0.75"
        );
    }

    #[test]
    fn test_random_file_uniform() {
        let pool = pool_two_speakers();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let f = pool.random_file("bob", &mut rng).unwrap();
            assert!(f.path.starts_with("/b"));
        }
    }
}
