// Sequence extension: autoregressive sampling with stochastic jolts.
//
// Grows a seed matrix to the requested length one timestep at a time. Each
// step feeds only the most recent row to the predictor (never a longer
// context) and perturbs the prediction before appending it:
//
//   1. Gaussian noise, σ = temperature × noise_scale.
//   2. Blend toward the previous row: 0.98 × predicted + 0.02 × previous.
//   3. Every `surprise_period` steps, a "surprise" term.
//   4. Every `harmonic_jump_period` steps, a "harmonic jump" term.
//   5. Every `rhythmic_period` steps, a "rhythmic variation" term.
//
// Step indices count from the start of extension (the first generated row
// is step 0, which therefore receives all three periodic terms).
//
// The only failure mode is the predictor itself. A predictor error aborts
// the call and no partial matrix is returned.

use crate::error::PredictorError;
use crate::matrix::TimeFrequencyMatrix;
use crate::predictor::Predictor;
use harmonia_prng::HarmoniaRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Noise schedule for extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendParams {
    /// Per-step noise scale (multiplied by temperature).
    pub noise_scale: f64,
    /// Weight of the noisy prediction in the continuity blend.
    pub prediction_weight: f64,
    /// Weight of the previous row in the continuity blend.
    pub continuity_weight: f64,
    pub surprise_period: usize,
    pub surprise_scale: f64,
    pub harmonic_jump_period: usize,
    pub harmonic_jump_scale: f64,
    pub rhythmic_period: usize,
    pub rhythmic_scale: f64,
}

impl Default for ExtendParams {
    fn default() -> Self {
        ExtendParams {
            noise_scale: 0.3,
            prediction_weight: 0.98,
            continuity_weight: 0.02,
            surprise_period: 8,
            surprise_scale: 0.4,
            harmonic_jump_period: 15,
            harmonic_jump_scale: 0.5,
            rhythmic_period: 12,
            rhythmic_scale: 0.2,
        }
    }
}

/// Add `N(0, σ²)` to every value of `row`.
fn add_noise(row: &mut [f64], sigma: f64, rng: &mut HarmoniaRng) {
    for v in row.iter_mut() {
        *v += rng.next_gaussian() * sigma;
    }
}

/// `period == 0` disables a periodic term.
fn fires(step: usize, period: usize) -> bool {
    period != 0 && step % period == 0
}

/// Extend `seed` to `total_length` timesteps.
///
/// The first `seed.timesteps()` rows of the result are bit-identical to the
/// seed. If `total_length` is not larger than the seed, the seed is returned
/// unchanged. An empty seed is bootstrapped from an all-zero input row.
pub fn extend<P: Predictor>(
    predictor: &P,
    seed: &TimeFrequencyMatrix,
    temperature: f64,
    total_length: usize,
    params: &ExtendParams,
    rng: &mut HarmoniaRng,
) -> Result<TimeFrequencyMatrix, PredictorError> {
    let bins = seed.bins();
    if predictor.band_count() != bins {
        return Err(PredictorError::InputWidth {
            expected: predictor.band_count(),
            actual: bins,
        });
    }

    let mut sequence = seed.clone();
    let steps = total_length.saturating_sub(seed.timesteps());
    sequence.reserve_rows(steps);

    let mut state = predictor.reset();
    let mut last: Vec<f32> = seed
        .last_row()
        .map_or_else(|| vec![0.0; bins], <[f32]>::to_vec);
    let mut frame = vec![0.0f64; bins];

    for step in 0..steps {
        let (predicted, next_state) = predictor.step(state, &last)?;
        state = next_state;
        if predicted.len() != bins {
            return Err(PredictorError::OutputWidth {
                expected: bins,
                actual: predicted.len(),
            });
        }

        for (f, &p) in frame.iter_mut().zip(&predicted) {
            *f = p as f64;
        }
        add_noise(&mut frame, temperature * params.noise_scale, rng);
        for (f, &prev) in frame.iter_mut().zip(&last) {
            *f = *f * params.prediction_weight + prev as f64 * params.continuity_weight;
        }
        if fires(step, params.surprise_period) {
            add_noise(&mut frame, temperature * params.surprise_scale, rng);
        }
        if fires(step, params.harmonic_jump_period) {
            add_noise(&mut frame, temperature * params.harmonic_jump_scale, rng);
        }
        if fires(step, params.rhythmic_period) {
            add_noise(&mut frame, temperature * params.rhythmic_scale, rng);
        }

        for (l, &f) in last.iter_mut().zip(&frame) {
            *l = f as f32;
        }
        sequence
            .push_row(&last)
            .map_err(|_| PredictorError::OutputWidth {
                expected: bins,
                actual: last.len(),
            })?;
    }

    debug!(
        steps,
        temperature,
        timesteps = sequence.timesteps(),
        "extended sequence"
    );
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{ConstantPredictor, EchoPredictor};

    fn ramp_seed(timesteps: usize, bins: usize) -> TimeFrequencyMatrix {
        let rows: Vec<Vec<f32>> = (0..timesteps)
            .map(|t| (0..bins).map(|b| (t * bins + b) as f32 * 0.01).collect())
            .collect();
        TimeFrequencyMatrix::from_rows(&rows).unwrap()
    }

    /// Fails on its `fail_at`-th step.
    struct FlakyPredictor {
        bands: usize,
        fail_at: usize,
    }

    impl Predictor for FlakyPredictor {
        type State = usize;
        fn band_count(&self) -> usize {
            self.bands
        }
        fn reset(&self) -> usize {
            0
        }
        fn step(&self, n: usize, input: &[f32]) -> Result<(Vec<f32>, usize), PredictorError> {
            if n == self.fail_at {
                return Err(PredictorError::NonFinite { bin: 0 });
            }
            Ok((input.to_vec(), n + 1))
        }
    }

    #[test]
    fn test_prefix_preserved_and_length() {
        let seed = ramp_seed(10, 6);
        let predictor = EchoPredictor { bands: 6 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let out = extend(&predictor, &seed, 1.0, 25, &params, &mut rng).unwrap();
        assert_eq!(out.shape(), (25, 6));
        for t in 0..10 {
            assert_eq!(out.row(t), seed.row(t));
        }
    }

    #[test]
    fn test_all_zero_seed_extends() {
        let seed = TimeFrequencyMatrix::zeros(100, 36).unwrap();
        let predictor = EchoPredictor { bands: 36 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(42);
        let out = extend(&predictor, &seed, 1.0, 108, &params, &mut rng).unwrap();
        assert_eq!(out.timesteps(), 108);
        assert!(out.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_temperature_is_pure_blend() {
        // No noise: each row is 0.98·c + 0.02·previous.
        let seed = TimeFrequencyMatrix::zeros(1, 2).unwrap();
        let predictor = ConstantPredictor {
            row: vec![1.0, 2.0],
        };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(0);
        let out = extend(&predictor, &seed, 0.0, 3, &params, &mut rng).unwrap();
        assert!((out.get(1, 0) - 0.98).abs() < 1e-6);
        assert!((out.get(1, 1) - 1.96).abs() < 1e-6);
        let expected = 0.98f32 + 0.02 * 0.98;
        assert!((out.get(2, 0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_periodic_terms_perturb_only_their_steps() {
        // With the base noise off, a row departs from the blend of the
        // constant prediction and its predecessor only when a periodic term
        // fires: steps 0 (all three), 8 (surprise), 12 (rhythmic), 15 (jump).
        let c = [0.5f32, -0.25, 1.0, 0.0];
        let predictor = ConstantPredictor { row: c.to_vec() };
        let seed = TimeFrequencyMatrix::zeros(1, 4).unwrap();
        let params = ExtendParams {
            noise_scale: 0.0,
            ..ExtendParams::default()
        };
        let mut rng = HarmoniaRng::new(12);
        let out = extend(&predictor, &seed, 1.0, 17, &params, &mut rng).unwrap();

        let departs = |step: usize| {
            let (prev, row) = (out.row(step), out.row(step + 1));
            row.iter().zip(prev).zip(&c).any(|((&v, &p), &ci)| {
                let blend = 0.98 * f64::from(ci) + 0.02 * f64::from(p);
                (f64::from(v) - blend).abs() > 1e-5
            })
        };
        let perturbed: Vec<usize> = (0..16).filter(|&step| departs(step)).collect();
        assert_eq!(perturbed, vec![0, 8, 12, 15]);
    }

    #[test]
    fn test_same_rng_seed_reproduces() {
        let seed = ramp_seed(4, 5);
        let predictor = EchoPredictor { bands: 5 };
        let params = ExtendParams::default();
        let run = |rng_seed: u64| {
            let mut rng = HarmoniaRng::new(rng_seed);
            extend(&predictor, &seed, 1.5, 40, &params, &mut rng).unwrap()
        };
        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }

    #[test]
    fn test_higher_temperature_spreads_more() {
        let seed = TimeFrequencyMatrix::zeros(1, 16).unwrap();
        let predictor = ConstantPredictor { row: vec![0.0; 16] };
        let params = ExtendParams::default();
        let spread = |temp: f64| {
            let mut rng = HarmoniaRng::new(5);
            let out = extend(&predictor, &seed, temp, 200, &params, &mut rng).unwrap();
            out.values().iter().map(|v| (*v as f64).powi(2)).sum::<f64>()
        };
        assert!(spread(2.8) > spread(0.5));
    }

    #[test]
    fn test_predictor_error_propagates() {
        let seed = ramp_seed(3, 4);
        let predictor = FlakyPredictor {
            bands: 4,
            fail_at: 5,
        };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let err = extend(&predictor, &seed, 1.0, 20, &params, &mut rng).unwrap_err();
        assert!(matches!(err, PredictorError::NonFinite { .. }));
    }

    #[test]
    fn test_band_mismatch_is_fatal() {
        let seed = ramp_seed(3, 4);
        let predictor = EchoPredictor { bands: 8 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let err = extend(&predictor, &seed, 1.0, 10, &params, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            PredictorError::InputWidth {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_short_target_returns_seed() {
        let seed = ramp_seed(10, 3);
        let predictor = EchoPredictor { bands: 3 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let out = extend(&predictor, &seed, 1.0, 4, &params, &mut rng).unwrap();
        assert_eq!(out, seed);
    }

    #[test]
    fn test_periodic_terms() {
        assert!(fires(0, 8));
        assert!(fires(16, 8));
        assert!(!fires(7, 8));
        assert!(!fires(0, 0));
    }
}
