//! Output records: per-mixture metadata accumulator, the finished
//! mixture record, and batch collation for downstream consumers.

use std::path::PathBuf;

use serde::Serialize;

use crate::audio::mix::Padding;

/// Number of source slots every record carries, regardless of how many
/// speakers were actually mixed.
pub const NUM_SOURCE_SLOTS: usize = 3;

/// Call-local metadata accumulator filled while a mixture is being
/// generated. Owned by a single `generate` call; never shared between
/// requests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MixInfo {
    pub num_spkrs: usize,
    pub speakers: Vec<String>,
    /// Source file per mixed speaker, longest-first after sorting.
    pub sources: Vec<PathBuf>,
    /// Sampled truncation length per source, in samples.
    pub source_lengths: Vec<usize>,
    /// One (overlap ratio, paddings) entry per mixing step; paddings are
    /// (new source, running mixture) in that order.
    pub overlap_ratios_paddings: Vec<(f64, [Padding; 2])>,
    /// Sampled target loudness per source, dB LUFS.
    pub source_loudness: Vec<f64>,
    pub noise_loudness: Option<f64>,
    pub noise: Option<PathBuf>,
    pub rir: Option<PathBuf>,
    /// Mixture duration in seconds.
    pub duration: f64,
    /// Backing dataset records for the selected sources, when a dataset
    /// is bound.
    pub data: Vec<serde_json::Value>,
}

impl MixInfo {
    /// The `overlapR1-R2` fragment of a mixture id.
    pub(crate) fn overlap_tag(&self) -> String {
        self.overlap_ratios_paddings
            .iter()
            .map(|(ratio, _)| format!("{ratio:.2}"))
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// One generated mixture. Immutable once produced; all buffers are owned
/// and share the mixture's length.
#[derive(Debug, Clone)]
pub struct MixtureRecord {
    pub id: String,
    pub mixture: Vec<f64>,
    /// Exactly three slots; unused ones are zero buffers.
    pub sources: [Vec<f64>; NUM_SOURCE_SLOTS],
    /// Zero buffer when no noise was added.
    pub noise: Vec<f64>,
    pub metadata: MixInfo,
}

impl MixtureRecord {
    pub fn len(&self) -> usize {
        self.mixture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture.is_empty()
    }
}

/// A batch of records padded to a common length.
#[derive(Debug, Clone)]
pub struct Batch {
    pub ids: Vec<String>,
    pub mixtures: Vec<Vec<f64>>,
    pub sources: Vec<[Vec<f64>; NUM_SOURCE_SLOTS]>,
    pub noises: Vec<Vec<f64>>,
    /// Pre-padding length of each record, in samples.
    pub lengths: Vec<usize>,
}

/// Pad every buffer in the batch with trailing zeros to the longest
/// record's length.
pub fn collate(records: Vec<MixtureRecord>) -> Batch {
    let max_len = records.iter().map(MixtureRecord::len).max().unwrap_or(0);

    let mut batch = Batch {
        ids: Vec::with_capacity(records.len()),
        mixtures: Vec::with_capacity(records.len()),
        sources: Vec::with_capacity(records.len()),
        noises: Vec::with_capacity(records.len()),
        lengths: Vec::with_capacity(records.len()),
    };

    for record in records {
        batch.lengths.push(record.len());
        batch.ids.push(record.id);
        batch.mixtures.push(pad_to(record.mixture, max_len));
        batch
            .sources
            .push(record.sources.map(|s| pad_to(s, max_len)));
        batch.noises.push(pad_to(record.noise, max_len));
    }
    batch
}

fn pad_to(mut samples: Vec<f64>, len: usize) -> Vec<f64> {
    samples.resize(len, 0.0);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, len: usize, fill: f64) -> MixtureRecord {
        MixtureRecord {
            id: id.to_string(),
            mixture: vec![fill; len],
            sources: [vec![fill; len], vec![0.0; len], vec![0.0; len]],
            noise: vec![0.0; len],
            metadata: MixInfo::default(),
        }
    }

    #[test]
    fn test_collate_pads_to_longest() {
        let batch = collate(vec![record("a", 100, 0.5), record("b", 250, 0.2)]);
        assert_eq!(batch.lengths, vec![100, 250]);
        for mixture in &batch.mixtures {
            assert_eq!(mixture.len(), 250);
        }
        for sources in &batch.sources {
            assert!(sources.iter().all(|s| s.len() == 250));
        }
        // Padding is trailing zeros
        assert_eq!(batch.mixtures[0][99], 0.5);
        assert_eq!(batch.mixtures[0][100], 0.0);
    }

    #[test]
    fn test_collate_empty() {
        let batch = collate(Vec::new());
        assert!(batch.ids.is_empty());
        assert!(batch.mixtures.is_empty());
    }

    #[test]
    fn test_overlap_tag_format() {
        let mut info = MixInfo::default();
        info.overlap_ratios_paddings.push((0.25, [(0, 10), (5, 0)]));
        info.overlap_ratios_paddings.push((1.0, [(0, 0), (0, 0)]));
        assert_eq!(info.overlap_tag(), "0.25-1.00");
    }

    #[test]
    fn test_metadata_serializes() {
        let mut info = MixInfo::default();
        info.speakers.push("alice".into());
        info.sources.push("/a/1.wav".into());
        info.duration = 2.5;
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["speakers"][0], "alice");
        assert_eq!(json["duration"], 2.5);
    }
}
