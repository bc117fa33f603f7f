// Multi-attempt selection.
//
// Runs the extender several times at increasing temperatures, scores each
// result, and keeps the best. Attempt 0 runs at the caller's base
// temperature; attempt i > 0 runs at 1.0 + 0.6·i, so later attempts explore
// more aggressively. Every attempt runs; there is no early exit. A later
// attempt replaces the current best only with a strictly greater score, so
// ties keep the earliest attempt.
//
// Attempts run sequentially. Each gets a fresh predictor state (reset inside
// `extend`) and its own RNG stream forked from the caller's generator.
// A predictor error in any attempt aborts the whole selection.

use crate::error::GenerateError;
use crate::extend::{ExtendParams, extend};
use crate::matrix::TimeFrequencyMatrix;
use crate::predictor::Predictor;
use crate::quality;
use harmonia_prng::HarmoniaRng;
use tracing::info;

/// Temperature increment per attempt in the fixed schedule.
pub const TEMPERATURE_STEP: f64 = 0.6;

/// One scored extension run.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub index: usize,
    pub temperature: f64,
    pub sequence: TimeFrequencyMatrix,
    pub score: f64,
}

/// Temperature and score of one attempt, kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptSummary {
    pub temperature: f64,
    pub score: f64,
}

/// Outcome of a selection run.
#[derive(Debug, Clone)]
pub struct Selection {
    pub best: GenerationAttempt,
    /// Every attempt in run order.
    pub history: Vec<AttemptSummary>,
}

/// The fixed schedule: `1.0 + 0.6·index`.
pub fn scheduled_temperature(index: usize) -> f64 {
    1.0 + index as f64 * TEMPERATURE_STEP
}

/// Attempt 0 uses `base`; later attempts follow the fixed schedule.
pub fn temperature_for_attempt(index: usize, base: f64) -> f64 {
    if index == 0 {
        base
    } else {
        scheduled_temperature(index)
    }
}

/// Select the best of `attempts` extensions of a single seed.
pub fn select_best<P: Predictor>(
    predictor: &P,
    seed: &TimeFrequencyMatrix,
    attempts: usize,
    base_temperature: f64,
    total_length: usize,
    params: &ExtendParams,
    rng: &mut HarmoniaRng,
) -> Result<Selection, GenerateError> {
    select_best_with(
        predictor,
        attempts,
        base_temperature,
        total_length,
        params,
        rng,
        |_, _| seed.clone(),
    )
}

/// Select the best of `attempts` extensions, drawing a seed per attempt.
///
/// `seed_for` receives the attempt index and that attempt's RNG stream.
pub fn select_best_with<P, F>(
    predictor: &P,
    attempts: usize,
    base_temperature: f64,
    total_length: usize,
    params: &ExtendParams,
    rng: &mut HarmoniaRng,
    mut seed_for: F,
) -> Result<Selection, GenerateError>
where
    P: Predictor,
    F: FnMut(usize, &mut HarmoniaRng) -> TimeFrequencyMatrix,
{
    if attempts == 0 {
        return Err(GenerateError::InvalidRequest(
            "at least one attempt is required".to_string(),
        ));
    }

    let mut best: Option<GenerationAttempt> = None;
    let mut history = Vec::with_capacity(attempts);

    for index in 0..attempts {
        let mut attempt_rng = rng.fork();
        let temperature = temperature_for_attempt(index, base_temperature);
        let seed = seed_for(index, &mut attempt_rng);
        let sequence = extend(
            predictor,
            &seed,
            temperature,
            total_length,
            params,
            &mut attempt_rng,
        )?;
        let score = quality::score(&sequence);
        info!(
            attempt = index + 1,
            of = attempts,
            temperature,
            score,
            "attempt scored"
        );
        history.push(AttemptSummary { temperature, score });

        let improves = best.as_ref().is_none_or(|b| score > b.score);
        if improves {
            best = Some(GenerationAttempt {
                index,
                temperature,
                sequence,
                score,
            });
        }
    }

    let best = best.ok_or_else(|| {
        GenerateError::InvalidRequest("no attempt produced a sequence".to_string())
    })?;
    info!(
        index = best.index,
        score = best.score,
        "best attempt selected"
    );
    Ok(Selection { best, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictorError;
    use crate::predictor::{ConstantPredictor, EchoPredictor};

    #[test]
    fn test_temperature_schedule() {
        assert_eq!(temperature_for_attempt(0, 1.2), 1.2);
        assert_eq!(temperature_for_attempt(0, 0.3), 0.3);
        assert!((temperature_for_attempt(3, 1.2) - 2.8).abs() < 1e-12);
        assert!((scheduled_temperature(3) - (1.0 + 3.0 * 0.6)).abs() < 1e-12);
        for i in 1..10 {
            assert!(scheduled_temperature(i + 1) > scheduled_temperature(i));
        }
    }

    #[test]
    fn test_best_is_max_of_history() {
        let seed = TimeFrequencyMatrix::zeros(20, 12).unwrap();
        let predictor = EchoPredictor { bands: 12 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(11);
        let sel = select_best(&predictor, &seed, 6, 1.2, 60, &params, &mut rng).unwrap();
        assert_eq!(sel.history.len(), 6);
        let max = sel
            .history
            .iter()
            .map(|a| a.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(sel.best.score, max);
        assert!(sel.history.iter().all(|a| sel.best.score >= a.score));
        assert_eq!(sel.history[sel.best.index].score, sel.best.score);
        assert_eq!(sel.best.sequence.timesteps(), 60);
    }

    #[test]
    fn test_ties_keep_earliest() {
        // A zero-length extension returns the seed unchanged, so every
        // attempt ties.
        let seed = TimeFrequencyMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let predictor = ConstantPredictor { row: vec![0.5; 2] };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(2);
        let sel = select_best(&predictor, &seed, 4, 1.0, 2, &params, &mut rng).unwrap();
        assert!(sel.history.windows(2).all(|w| w[0].score == w[1].score));
        assert_eq!(sel.best.index, 0);
        assert_eq!(sel.best.temperature, 1.0);
    }

    #[test]
    fn test_all_attempts_run_and_temperatures_recorded() {
        let seed = TimeFrequencyMatrix::zeros(4, 3).unwrap();
        let predictor = EchoPredictor { bands: 3 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(5);
        let mut seen = Vec::new();
        let sel = select_best_with(&predictor, 4, 0.7, 10, &params, &mut rng, |i, _| {
            seen.push(i);
            seed.clone()
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        let temps: Vec<f64> = sel.history.iter().map(|a| a.temperature).collect();
        assert_eq!(temps[0], 0.7);
        assert!((temps[1] - 1.6).abs() < 1e-12);
        assert!((temps[3] - 2.8).abs() < 1e-12);
    }

    #[test]
    fn test_reproducible_with_same_rng_seed() {
        let seed = TimeFrequencyMatrix::zeros(8, 6).unwrap();
        let predictor = EchoPredictor { bands: 6 };
        let params = ExtendParams::default();
        let run = || {
            let mut rng = HarmoniaRng::new(77);
            select_best(&predictor, &seed, 3, 1.2, 30, &params, &mut rng).unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.best.index, b.best.index);
        assert_eq!(a.best.sequence, b.best.sequence);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let seed = TimeFrequencyMatrix::zeros(4, 3).unwrap();
        let predictor = EchoPredictor { bands: 3 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let err = select_best(&predictor, &seed, 0, 1.0, 8, &params, &mut rng).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRequest(_)));
    }

    #[test]
    fn test_predictor_failure_aborts() {
        let seed = TimeFrequencyMatrix::zeros(4, 3).unwrap();
        let predictor = EchoPredictor { bands: 5 };
        let params = ExtendParams::default();
        let mut rng = HarmoniaRng::new(1);
        let err = select_best(&predictor, &seed, 3, 1.0, 8, &params, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Predictor(PredictorError::InputWidth { .. })
        ));
    }
}
