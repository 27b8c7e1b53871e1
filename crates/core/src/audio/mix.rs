//! Two-buffer overlap mixing.
//!
//! Aligns two mono buffers according to a target overlap in samples,
//! zero-pads both to a common length, and sums them. Positive overlap
//! counts shared samples at the junction; `overlap_samples <= 0` inserts
//! that much silence between the buffers instead.

use rand::rngs::StdRng;
use rand::Rng;

/// (left, right) zero-padding applied to a buffer.
pub type Padding = (usize, usize);

/// Result of mixing two buffers. `padded` and `paddings` are in the
/// order of the original `(a, b)` arguments, regardless of which buffer
/// was treated as the longer one internally.
#[derive(Debug, Clone)]
pub struct MixOutcome {
    pub mixture: Vec<f64>,
    pub padded: [Vec<f64>; 2],
    pub paddings: [Padding; 2],
}

/// Mix `a` and `b` with randomized alignment.
///
/// Random choices: which buffer starts first (50/50, partial and
/// no-overlap cases), and the left offset of the shorter buffer inside
/// the longer one (full-overlap case).
pub fn mix_sources(a: &[f64], b: &[f64], overlap_samples: i64, rng: &mut StdRng) -> MixOutcome {
    let n_diff = a.len().abs_diff(b.len());
    let shorter_first = rng.gen_bool(0.5);
    let full_lpad = if n_diff > 0 { rng.gen_range(0..n_diff) } else { 0 };
    mix_sources_aligned(a, b, overlap_samples, shorter_first, full_lpad)
}

/// Deterministic core of [`mix_sources`]: the caller supplies the
/// alignment choices instead of an rng.
///
/// `full_lpad` must be `< len(longer) - len(shorter)` when the lengths
/// differ; it is ignored outside the full-overlap case.
pub fn mix_sources_aligned(
    a: &[f64],
    b: &[f64],
    overlap_samples: i64,
    shorter_first: bool,
    full_lpad: usize,
) -> MixOutcome {
    // Ties make the first argument the longer one
    let swapped = a.len() >= b.len();
    let (longer, shorter) = if swapped { (a, b) } else { (b, a) };
    let n_long = longer.len();
    let n_short = shorter.len();
    let n_diff = n_long - n_short;

    // Paddings as [shorter, longer]
    let paddings: [Padding; 2] = if overlap_samples >= n_short as i64 {
        // Full overlap: shorter sits inside the longer at a chosen offset
        let lpad = if n_diff > 0 { full_lpad.min(n_diff - 1) } else { 0 };
        [(lpad, n_diff - lpad), (0, 0)]
    } else if overlap_samples > 0 {
        // Partial overlap at the junction
        let n_total = n_long + n_short - overlap_samples as usize;
        if shorter_first {
            [(0, n_total - n_short), (n_total - n_long, 0)]
        } else {
            [(n_total - n_short, 0), (0, n_total - n_long)]
        }
    } else {
        // No overlap: silence between the buffers
        let silence = overlap_samples.unsigned_abs() as usize;
        if shorter_first {
            [(0, silence + n_long), (silence + n_short, 0)]
        } else {
            [(silence + n_long, 0), (0, silence + n_short)]
        }
    };

    let padded_shorter = pad(shorter, paddings[0]);
    let padded_longer = pad(longer, paddings[1]);
    debug_assert_eq!(padded_shorter.len(), padded_longer.len());

    let mixture: Vec<f64> = padded_shorter
        .iter()
        .zip(padded_longer.iter())
        .map(|(x, y)| x + y)
        .collect();

    // Hand results back in (a, b) argument order
    let (padded, paddings) = if swapped {
        ([padded_longer, padded_shorter], [paddings[1], paddings[0]])
    } else {
        ([padded_shorter, padded_longer], [paddings[0], paddings[1]])
    };

    MixOutcome { mixture, padded, paddings }
}

/// Zero-pad a buffer on the left and right.
pub fn pad(samples: &[f64], (lpad, rpad): Padding) -> Vec<f64> {
    let mut out = Vec::with_capacity(lpad + samples.len() + rpad);
    out.resize(lpad, 0.0);
    out.extend_from_slice(samples);
    out.resize(out.len() + rpad, 0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i + 1) as f64 / n as f64).collect()
    }

    #[test]
    fn test_partial_overlap_length_formula() {
        // len = L1 + L2 - overlap for 0 < overlap < min(L1, L2)
        let mut rng = StdRng::seed_from_u64(1);
        for (l1, l2, ov) in [(1000usize, 1600usize, 400i64), (50, 50, 10), (300, 200, 199)] {
            let out = mix_sources(&ramp(l1), &ramp(l2), ov, &mut rng);
            let expect = l1 + l2 - ov as usize;
            assert_eq!(out.mixture.len(), expect);
            assert_eq!(out.padded[0].len(), expect);
            assert_eq!(out.padded[1].len(), expect);
        }
    }

    #[test]
    fn test_full_overlap_length_is_max() {
        let mut rng = StdRng::seed_from_u64(2);
        let out = mix_sources(&ramp(1000), &ramp(1600), 1000, &mut rng);
        assert_eq!(out.mixture.len(), 1600);
        let out = mix_sources(&ramp(1600), &ramp(1000), 5000, &mut rng);
        assert_eq!(out.mixture.len(), 1600);
    }

    #[test]
    fn test_no_overlap_inserts_silence() {
        let mut rng = StdRng::seed_from_u64(3);
        let out = mix_sources(&ramp(100), &ramp(200), -50, &mut rng);
        assert_eq!(out.mixture.len(), 100 + 200 + 50);
        let out = mix_sources(&ramp(100), &ramp(200), 0, &mut rng);
        assert_eq!(out.mixture.len(), 300);
    }

    #[test]
    fn test_partial_overlap_region_is_elementwise_sum() {
        // 1000 + 1600 with 400 shared samples, shorter starting first:
        // shorter spans [0, 1000), longer spans [600, 2200)
        let a = ramp(1000);
        let b = ramp(1600);
        let out = mix_sources_aligned(&a, &b, 400, true, 0);
        assert_eq!(out.mixture.len(), 2200);
        assert_eq!(out.paddings, [(0, 1200), (600, 0)]);
        for i in 0..400 {
            let expect = a[600 + i] + b[i];
            assert!((out.mixture[600 + i] - expect).abs() < 1e-12);
        }
        // Outside the overlap each region is a single buffer
        assert!((out.mixture[0] - a[0]).abs() < 1e-12);
        assert!((out.mixture[2199] - b[1599]).abs() < 1e-12);
    }

    #[test]
    fn test_paddings_follow_argument_order() {
        // Same alignment, both argument orders: each argument's padding
        // and padded buffer must stay attached to it.
        let short = ramp(100);
        let long = ramp(300);

        let fwd = mix_sources_aligned(&short, &long, 40, true, 0);
        let rev = mix_sources_aligned(&long, &short, 40, true, 0);

        assert_eq!(fwd.paddings[0], rev.paddings[1]);
        assert_eq!(fwd.paddings[1], rev.paddings[0]);
        assert_eq!(fwd.padded[0], rev.padded[1]);
        assert_eq!(fwd.padded[1], rev.padded[0]);
        assert_eq!(fwd.mixture, rev.mixture);
    }

    #[test]
    fn test_equal_lengths_tie_break() {
        // Ties treat the first argument as the longer one
        let a = ramp(100);
        let b: Vec<f64> = ramp(100).iter().map(|x| x * 2.0).collect();
        let out = mix_sources_aligned(&a, &b, 100, true, 0);
        // Full overlap of equal lengths: both unpadded
        assert_eq!(out.paddings, [(0, 0), (0, 0)]);
        assert_eq!(out.mixture.len(), 100);
        for i in 0..100 {
            assert!((out.mixture[i] - (a[i] + b[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn test_full_overlap_offset_positions_shorter() {
        // lpad forced to 7: the shorter buffer occupies [7, 7 + 100)
        let short = vec![1.0; 100];
        let long = vec![0.0; 250];
        let out = mix_sources_aligned(&short, &long, 100, true, 7);
        assert_eq!(out.paddings[0], (7, 143));
        assert_eq!(out.mixture.len(), 250);
        assert_eq!(out.mixture[6], 0.0);
        assert_eq!(out.mixture[7], 1.0);
        assert_eq!(out.mixture[106], 1.0);
        assert_eq!(out.mixture[107], 0.0);
    }

    #[test]
    fn test_mixture_is_sum_of_padded() {
        let mut rng = StdRng::seed_from_u64(9);
        for ov in [-100i64, 0, 37, 100, 5000] {
            let out = mix_sources(&ramp(150), &ramp(400), ov, &mut rng);
            for i in 0..out.mixture.len() {
                let expect = out.padded[0][i] + out.padded[1][i];
                assert!((out.mixture[i] - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_single_sample_edge_lengths() {
        let mut rng = StdRng::seed_from_u64(4);
        // One-sample buffers through every branch
        let out = mix_sources(&[0.5], &ramp(500), 1, &mut rng);
        assert_eq!(out.mixture.len(), 500);
        let out = mix_sources(&[0.5], &ramp(500), 0, &mut rng);
        assert_eq!(out.mixture.len(), 501);
        // Equal one-sample buffers fully overlap
        let out = mix_sources(&[0.5], &[0.25], 1, &mut rng);
        assert_eq!(out.mixture.len(), 1);
        assert!((out.mixture[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad(&[1.0, 2.0], (1, 2)), vec![0.0, 1.0, 2.0, 0.0, 0.0]);
        assert_eq!(pad(&[], (2, 1)), vec![0.0, 0.0, 0.0]);
    }
}
