// Quality scoring for generated sequences.
//
// A pure function of the matrix values, combining five terms:
//
//   smoothness        = -0.5 × mean over bins of std(first differences)
//   harmonic richness = #bins whose time-mean exceeds the 70th percentile
//                       of all bin means
//   dynamic range     = max - min
//   variation         = 0.3 × std(all first differences)
//   change bonus      = 0.01 × #|first difference| > 0.5 × std(sequence)
//
//   score = smoothness + 0.1 × richness + 0.01 × range + variation + bonus
//
// Standard deviations are population (divide by n). Percentiles use linear
// interpolation between order statistics. Sequences with fewer than two
// timesteps have no differences; the difference-based terms are zero.
//
// Higher is better. The scale is unbounded; scores are only compared
// against each other by select.rs.

use crate::matrix::TimeFrequencyMatrix;

/// Term weights. `Default` gives the standard mix.
#[derive(Debug, Clone)]
pub struct QualityWeights {
    pub smoothness: f64,
    pub richness: f64,
    pub richness_percentile: f64,
    pub dynamic_range: f64,
    pub variation: f64,
    pub change_threshold: f64,
    pub change_bonus: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        QualityWeights {
            smoothness: 0.5,
            richness: 0.1,
            richness_percentile: 70.0,
            dynamic_range: 0.01,
            variation: 0.3,
            change_threshold: 0.5,
            change_bonus: 0.01,
        }
    }
}

/// Weighted contributions of each term. `total()` is the score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityBreakdown {
    pub smoothness: f64,
    pub harmonic_richness: f64,
    pub dynamic_range: f64,
    pub variation: f64,
    pub change_bonus: f64,
}

impl QualityBreakdown {
    pub fn total(&self) -> f64 {
        self.smoothness
            + self.harmonic_richness
            + self.dynamic_range
            + self.variation
            + self.change_bonus
    }
}

/// Score a sequence with the default weights.
pub fn score(sequence: &TimeFrequencyMatrix) -> f64 {
    score_breakdown(sequence, &QualityWeights::default()).total()
}

/// Per-term scores.
pub fn score_breakdown(
    sequence: &TimeFrequencyMatrix,
    weights: &QualityWeights,
) -> QualityBreakdown {
    let diff = sequence.time_diff();
    let bins = sequence.bins();

    let smoothness = if diff.is_empty() {
        0.0
    } else {
        let per_bin_std: f64 = (0..bins)
            .map(|b| std_dev((0..diff.timesteps()).map(|t| diff.get(t, b) as f64)))
            .sum::<f64>()
            / bins as f64;
        -per_bin_std * weights.smoothness
    };

    let bin_means = sequence.bin_means();
    let richness = if sequence.is_empty() {
        0
    } else {
        let threshold = percentile(&bin_means, weights.richness_percentile);
        bin_means.iter().filter(|&&m| m > threshold).count()
    };

    let (min, max) = sequence
        .values()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });
    let range = if sequence.is_empty() { 0.0 } else { max - min };

    let variation = if diff.is_empty() {
        0.0
    } else {
        std_dev(diff.values().iter().map(|&v| v as f64)) * weights.variation
    };

    let values = sequence.values().iter().map(|&v| v as f64);
    let change_cut = std_dev(values) * weights.change_threshold;
    let changes = diff
        .values()
        .iter()
        .filter(|&&d| (d as f64).abs() > change_cut)
        .count();

    QualityBreakdown {
        smoothness,
        harmonic_richness: richness as f64 * weights.richness,
        dynamic_range: range * weights.dynamic_range,
        variation,
        change_bonus: changes as f64 * weights.change_bonus,
    }
}

/// Population standard deviation. Zero for an empty input.
fn std_dev(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (n, sum) = values
        .clone()
        .fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    var.sqrt()
}

/// `q`-th percentile (0–100) with linear interpolation. `values` non-empty.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonia_prng::HarmoniaRng;

    fn noisy(timesteps: usize, bins: usize, seed: u64) -> TimeFrequencyMatrix {
        let mut rng = HarmoniaRng::new(seed);
        let rows: Vec<Vec<f32>> = (0..timesteps)
            .map(|_| (0..bins).map(|_| rng.next_gaussian() as f32).collect())
            .collect();
        TimeFrequencyMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_score_is_deterministic() {
        let m = noisy(50, 12, 3);
        assert_eq!(score(&m).to_bits(), score(&m).to_bits());
    }

    #[test]
    fn test_constant_sequence() {
        // No differences and flat bin means: every term is zero.
        let m = TimeFrequencyMatrix::from_rows(&vec![vec![1.0; 4]; 10]).unwrap();
        let b = score_breakdown(&m, &QualityWeights::default());
        assert_eq!(b.smoothness, 0.0);
        assert_eq!(b.harmonic_richness, 0.0);
        assert_eq!(b.dynamic_range, 0.0);
        assert_eq!(b.variation, 0.0);
        assert_eq!(b.change_bonus, 0.0);
        assert_eq!(score(&m), 0.0);
    }

    #[test]
    fn test_hand_computed_terms() {
        // Two bins, three steps.
        //   bin 0: 0, 2, 0   diffs  2, -2   std 2
        //   bin 1: 0, 0, 0   diffs  0,  0   std 0
        let rows = [vec![0.0, 0.0], vec![2.0, 0.0], vec![0.0, 0.0]];
        let m = TimeFrequencyMatrix::from_rows(&rows).unwrap();
        let b = score_breakdown(&m, &QualityWeights::default());
        assert!((b.smoothness - (-0.5 * 1.0)).abs() < 1e-12);
        // Bin means 2/3 and 0; 70th percentile = 0.7 × 2/3; only bin 0 above.
        assert!((b.harmonic_richness - 0.1).abs() < 1e-12);
        assert!((b.dynamic_range - 0.02).abs() < 1e-12);
        // All diffs: 2, 0, -2, 0 → std sqrt(2).
        assert!((b.variation - 0.3 * 2f64.sqrt()).abs() < 1e-12);
        // std of values: mean 1/3, var = (5·1/9 + 25/9)/6 = 5/9 → cut ≈ 0.373.
        // |diff| > cut: the two ±2 entries.
        assert!((b.change_bonus - 0.02).abs() < 1e-12);
        let total = -0.5 + 0.1 + 0.02 + 0.3 * 2f64.sqrt() + 0.02;
        assert!((score(&m) - total).abs() < 1e-12);
    }

    #[test]
    fn test_single_timestep_and_empty() {
        let one = TimeFrequencyMatrix::from_rows(&[vec![0.0, 1.0, 3.0]]).unwrap();
        let b = score_breakdown(&one, &QualityWeights::default());
        assert_eq!(b.smoothness, 0.0);
        assert_eq!(b.variation, 0.0);
        assert!((b.dynamic_range - 0.03).abs() < 1e-12);
        assert!(score(&one).is_finite());

        let empty = TimeFrequencyMatrix::new(4).unwrap();
        assert_eq!(score(&empty), 0.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 70.0) - 3.8).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 70.0), 7.0);
    }

    #[test]
    fn test_richer_energy_spread_scores_higher_richness() {
        // Energy in 3 of 10 bins vs energy in 1 of 10 bins.
        let mut wide = vec![0.0f32; 10];
        wide[..3].copy_from_slice(&[1.0, 2.0, 3.0]);
        let mut narrow = vec![0.0f32; 10];
        narrow[0] = 3.0;
        let w = score_breakdown(
            &TimeFrequencyMatrix::from_rows(&vec![wide; 4]).unwrap(),
            &QualityWeights::default(),
        );
        let n = score_breakdown(
            &TimeFrequencyMatrix::from_rows(&vec![narrow; 4]).unwrap(),
            &QualityWeights::default(),
        );
        assert!(w.harmonic_richness > n.harmonic_richness);
    }
}
