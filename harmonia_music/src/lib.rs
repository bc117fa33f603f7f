// Harmonia chord-progression generator
//
// Generates chord progressions by extending a time-frequency matrix with a
// pre-trained recurrent predictor, keeping the best of several stochastic
// attempts, and decoding the winner into timed chord events written as MIDI.
//
// Pipeline:
//   seed.rs → extend.rs (× attempts, scored by quality.rs, chosen by
//   select.rs) → decode.rs → midi.rs
//
// Architecture:
// - matrix.rs: TimeFrequencyMatrix, the (timestep × bin) energy grid
// - predictor.rs: the Predictor trait and a JSON-weight recurrent predictor
// - seed.rs: reference catalog, windowed real seeds, synthetic fallback
// - npy.rs: NumPy .npy reader/writer for stored reference matrices
// - extend.rs: autoregressive extension with noise and periodic jolts
// - quality.rs: heuristic sequence score (smoothness, richness, range, ...)
// - select.rs: temperature schedule and best-of-N selection
// - progression.rs: progression patterns, degree offsets, triad qualities
// - decode.rs: windowed matrix → chord events (root, quality, voicing, timing)
// - midi.rs: event validation, SMF export, SMF re-parsing
// - pipeline.rs: Generator tying the stages together
// - requests.rs: generate/export/analyze/health request handlers
// - symbols.rs: coarse chord-symbol helpers used by requests.rs
// - config.rs: JSON-loadable GeneratorConfig
// - error.rs: error enums for each stage
//
// Every random draw goes through a caller-supplied HarmoniaRng, so a run is
// reproducible from its seed.

pub mod config;
pub mod decode;
pub mod error;
pub mod extend;
pub mod matrix;
pub mod midi;
pub mod npy;
pub mod pipeline;
pub mod predictor;
pub mod progression;
pub mod quality;
pub mod requests;
pub mod seed;
pub mod select;
pub mod symbols;

pub use config::GeneratorConfig;
pub use error::{GenerateError, PredictorError, SeedError, TrackError};
pub use matrix::TimeFrequencyMatrix;
pub use midi::{ChordEvent, Note, Track};
pub use pipeline::{GenerationOutcome, Generator};
pub use predictor::{Predictor, RecurrentPredictor};
