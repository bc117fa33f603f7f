// End-to-end generation: seed → extend/score/select → decode.
//
// A `Generator` owns one predictor, a `GeneratorConfig` and a
// `SeedProvider`. `generate` validates the configuration against the
// predictor, runs the attempt selector (each attempt draws its own seed
// from the provider on its own forked RNG stream), and decodes the winning
// matrix into a validated `Track`.
//
// Calls are synchronous and self-contained: the generator holds no mutable
// state, so one instance can serve any number of sequential requests. A
// host that needs a deadline must wrap the whole `generate` call.

use crate::config::GeneratorConfig;
use crate::decode::decode;
use crate::error::GenerateError;
use crate::midi::Track;
use crate::predictor::Predictor;
use crate::seed::SeedProvider;
use crate::select::{Selection, select_best_with};
use harmonia_prng::HarmoniaRng;
use tracing::info;

/// Result of a full generation run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub selection: Selection,
    pub track: Track,
}

pub struct Generator<P> {
    predictor: P,
    config: GeneratorConfig,
    seeds: SeedProvider,
}

impl<P: Predictor> Generator<P> {
    /// Build a generator whose seeds come from `config.catalog_path`.
    pub fn new(predictor: P, config: GeneratorConfig) -> Result<Self, GenerateError> {
        let seeds = SeedProvider::from_catalog_path(config.catalog_path.clone());
        Self::with_seed_provider(predictor, config, seeds)
    }

    pub fn with_seed_provider(
        predictor: P,
        config: GeneratorConfig,
        seeds: SeedProvider,
    ) -> Result<Self, GenerateError> {
        validate(&config, predictor.band_count())?;
        Ok(Generator {
            predictor,
            config,
            seeds,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn seed_provider(&self) -> &SeedProvider {
        &self.seeds
    }

    /// Run the attempt selector with explicit attempt count and base
    /// temperature, leaving the rest of the configuration as is.
    pub fn select(
        &self,
        attempts: usize,
        base_temperature: f64,
        rng: &mut HarmoniaRng,
    ) -> Result<Selection, GenerateError> {
        check_temperature(base_temperature)?;
        let config = &self.config;
        select_best_with(
            &self.predictor,
            attempts,
            base_temperature,
            config.total_length,
            &config.extend,
            rng,
            |_, attempt_rng| {
                self.seeds
                    .get_seed(config.seed_length, config.band_count, attempt_rng)
            },
        )
    }

    /// Generate, score, select and decode with the configured parameters.
    pub fn generate(&self, rng: &mut HarmoniaRng) -> Result<GenerationOutcome, GenerateError> {
        let config = &self.config;
        info!(
            attempts = config.attempts,
            base_temperature = config.base_temperature,
            seed_length = config.seed_length,
            total_length = config.total_length,
            bands = config.band_count,
            "generating progression"
        );
        let selection = self.select(config.attempts, config.base_temperature, rng)?;
        let track = decode(
            &selection.best.sequence,
            config.tempo_bpm,
            &config.decoder,
            rng,
        )?;
        info!(
            chords = track.events().len(),
            ticks = track.length_ticks(),
            "decoded track"
        );
        Ok(GenerationOutcome { selection, track })
    }
}

fn check_temperature(temperature: f64) -> Result<(), GenerateError> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(GenerateError::InvalidRequest(format!(
            "temperature must be finite and non-negative, got {temperature}"
        )));
    }
    Ok(())
}

/// Reject configurations no generation run could satisfy.
pub fn validate(config: &GeneratorConfig, predictor_bands: usize) -> Result<(), GenerateError> {
    let invalid = |msg: String| Err(GenerateError::InvalidRequest(msg));
    if config.band_count == 0 {
        return invalid("band count must be at least 1".to_string());
    }
    if config.band_count != predictor_bands {
        return invalid(format!(
            "band count {} does not match the predictor's {}",
            config.band_count, predictor_bands
        ));
    }
    if config.attempts == 0 {
        return invalid("at least one attempt is required".to_string());
    }
    if config.total_length < config.seed_length {
        return invalid(format!(
            "total length {} is shorter than seed length {}",
            config.total_length, config.seed_length
        ));
    }
    if config.tempo_bpm == 0 {
        return invalid("tempo must be positive".to_string());
    }
    config.decoder.validate().map_err(GenerateError::InvalidRequest)?;
    check_temperature(config.base_temperature)
}
