// Error taxonomy for the generator.
//
// - PredictorError: the sequence model is missing, malformed, or failed
//   during a step. Fatal; aborts the whole generation request.
// - SeedError: anything that goes wrong while reading the reference catalog
//   or a reference matrix. Never leaves seed.rs: `SeedProvider::get_seed`
//   logs it and falls back to synthetic noise.
// - TrackError: a malformed chord event handed to the event emitter, or a
//   failure writing/parsing the MIDI bytes. Rejected immediately.
// - MatrixError: a row or buffer whose width disagrees with the matrix's
//   bin count.
// - GenerateError: what the pipeline surfaces to callers. Only fatal model
//   errors, validation errors, and bad request parameters appear here.

use std::path::PathBuf;
use thiserror::Error;

/// Shape errors when building or growing a time-frequency matrix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("a matrix needs at least one frequency bin")]
    NoBins,
    #[error("row {row} has {actual} bins, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("buffer of {len} values is not a multiple of {bins} bins")]
    Ragged { len: usize, bins: usize },
}

/// Errors raised at the predictor boundary.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("failed to read predictor weights from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed predictor weights: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("weight '{name}' has {actual} values, expected {expected}")]
    WeightShape {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("input row has {actual} bins, predictor expects {expected}")]
    InputWidth { expected: usize, actual: usize },
    #[error("predictor produced {actual} bins, expected {expected}")]
    OutputWidth { expected: usize, actual: usize },
    #[error("predictor produced a non-finite value at bin {bin}")]
    NonFinite { bin: usize },
}

/// Errors acquiring real seed data. Recoverable by construction.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no reference catalog configured")]
    NoCatalog,
    #[error("reference catalog {0} has no entries")]
    EmptyCatalog(PathBuf),
    #[error("malformed catalog line {line}: {reason}")]
    MalformedCatalog { line: usize, reason: String },
    #[error("malformed reference matrix {path}: {reason}")]
    MalformedMatrix { path: PathBuf, reason: String },
    #[error("unsupported reference format for {0}")]
    UnsupportedFormat(PathBuf),
}

/// Validation and serialization errors for chord events and tracks.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("chord event {index} has no notes")]
    EmptyChord { index: usize },
    #[error("chord event {index} has non-positive duration {duration}")]
    NonPositiveDuration { index: usize, duration: i64 },
    #[error("chord event {index} starts at negative tick {start}")]
    NegativeStart { index: usize, start: i64 },
    #[error("chord event {index} has pitch {pitch} outside the MIDI range")]
    PitchOutOfRange { index: usize, pitch: u8 },
    #[error("chord event {index} has velocity {velocity} outside 1..=127")]
    VelocityOutOfRange { index: usize, velocity: u8 },
    #[error("tempo must be positive, got {0} BPM")]
    InvalidTempo(u32),
    #[error("gap of {gap} ticks before tick {tick} exceeds the MIDI delta-time range")]
    TickGapTooLarge { tick: u64, gap: u64 },
    #[error("MIDI I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MIDI parse error: {0}")]
    Parse(#[from] midly::Error),
}

/// Errors surfaced to callers of the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("predictor failure: {0}")]
    Predictor(#[from] PredictorError),
    #[error("invalid track: {0}")]
    Track(#[from] TrackError),
    #[error("invalid matrix: {0}")]
    Matrix(#[from] MatrixError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
