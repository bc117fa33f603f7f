// Data-driven generator configuration.
//
// All tunable parameters of a generation run live in `GeneratorConfig`,
// loadable from JSON. Missing fields take their defaults, so a config file
// only needs to name what it changes. The noise schedule and decoder
// constants are nested groups (`ExtendParams`, `DecoderParams`) owned by
// the modules that consume them.
//
// See also: `pipeline.rs` which owns the config for a `Generator`.

use crate::decode::DecoderParams;
use crate::extend::ExtendParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Timesteps taken from the seed provider.
    pub seed_length: usize,
    /// Timesteps in each generated sequence, seed included.
    pub total_length: usize,
    /// Frequency bins per timestep. Must match the predictor.
    pub band_count: usize,
    /// Extension attempts per generation.
    pub attempts: usize,
    /// Temperature of attempt 0. Later attempts follow the fixed schedule.
    pub base_temperature: f64,
    /// Tempo written to the exported track.
    pub tempo_bpm: u32,
    /// CSV metadata index of reference spectrograms. `None` means always
    /// use synthetic seeds.
    pub catalog_path: Option<PathBuf>,
    /// JSON predictor weights. `None` means an untrained predictor.
    pub predictor_path: Option<PathBuf>,
    /// Hidden width of the untrained fallback predictor.
    pub untrained_hidden_size: usize,
    /// Fixed RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub extend: ExtendParams,
    pub decoder: DecoderParams,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            seed_length: 100,
            total_length: 200,
            band_count: 64,
            attempts: 5,
            base_temperature: 1.2,
            tempo_bpm: 120,
            catalog_path: None,
            predictor_path: None,
            untrained_hidden_size: 32,
            rng_seed: None,
            extend: ExtendParams::default(),
            decoder: DecoderParams::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = GeneratorConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: GeneratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed_length, 100);
        assert_eq!(back.total_length, 200);
        assert_eq!(back.decoder.window_steps, 4);
        assert_eq!(back.extend.surprise_period, 8);
    }

    #[test]
    fn config_loads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = r#"{
            "attempts": 3,
            "band_count": 36,
            "rng_seed": 7,
            "decoder": { "window_steps": 8 }
        }"#;
        std::fs::write(&path, json).unwrap();
        let config = GeneratorConfig::load(&path).unwrap();
        assert_eq!(config.attempts, 3);
        assert_eq!(config.band_count, 36);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.decoder.window_steps, 8);
        // Untouched groups keep their defaults.
        assert_eq!(config.decoder.ticks_per_step, 120);
        assert!((config.base_temperature - 1.2).abs() < 1e-12);
    }

    #[test]
    fn config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = GeneratorConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2").unwrap();
        assert!(matches!(GeneratorConfig::load(&bad), Err(ConfigError::Parse(_))));
    }
}
