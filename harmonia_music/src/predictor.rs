// The sequence-model boundary.
//
// The generator treats the trained model as an opaque two-stage predictor:
// a stateful recurrent encoder followed by a projection head. `Predictor`
// is the capability it needs: `reset` hands out fresh recurrent memory and
// `step` consumes exactly one input row, returning the predicted next row
// together with the updated memory.
//
// Implementations:
// - RecurrentPredictor: single-layer tanh recurrent encoder + linear head,
//   weights loaded from JSON exported by the training pipeline. Every matrix
//   shape is validated on load, every input row on step.
// - EchoPredictor: predicts the input row unchanged (persistence baseline).
// - ConstantPredictor: always predicts the same row.
//
// Errors from `step` are fatal for the attempt in progress; extend.rs
// propagates them without producing partial output.

use crate::error::PredictorError;
use harmonia_prng::HarmoniaRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A pre-trained next-row predictor with recurrent memory.
pub trait Predictor {
    /// Recurrent memory. Owned by one extension call at a time.
    type State;

    /// Width of input and output rows.
    fn band_count(&self) -> usize;

    /// Fresh memory for a new attempt.
    fn reset(&self) -> Self::State;

    /// Advance one timestep.
    fn step(
        &self,
        state: Self::State,
        input: &[f32],
    ) -> Result<(Vec<f32>, Self::State), PredictorError>;
}

/// Raw weights for `RecurrentPredictor`, as exported by the trainer.
///
/// Matrices are row-major: `w_ih` is `hidden_size × input_size`, `w_hh` is
/// `hidden_size × hidden_size`, `w_out` is `input_size × hidden_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentWeights {
    pub input_size: usize,
    pub hidden_size: usize,
    pub w_ih: Vec<f32>,
    pub w_hh: Vec<f32>,
    pub b_h: Vec<f32>,
    pub w_out: Vec<f32>,
    pub b_out: Vec<f32>,
}

impl RecurrentWeights {
    /// Check that every buffer matches the declared sizes.
    pub fn validate(&self) -> Result<(), PredictorError> {
        let (i, h) = (self.input_size, self.hidden_size);
        let checks: [(&'static str, usize, usize); 5] = [
            ("w_ih", h * i, self.w_ih.len()),
            ("w_hh", h * h, self.w_hh.len()),
            ("b_h", h, self.b_h.len()),
            ("w_out", i * h, self.w_out.len()),
            ("b_out", i, self.b_out.len()),
        ];
        for (name, expected, actual) in checks {
            if expected != actual {
                return Err(PredictorError::WeightShape {
                    name,
                    expected,
                    actual,
                });
            }
        }
        if i == 0 || h == 0 {
            return Err(PredictorError::WeightShape {
                name: "input_size/hidden_size",
                expected: 1,
                actual: 0,
            });
        }
        Ok(())
    }
}

/// Hidden state of a `RecurrentPredictor`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState(Vec<f32>);

impl RecurrentState {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Elman-style recurrent encoder with a linear projection head.
///
/// `h' = tanh(W_ih·x + W_hh·h + b_h)`, `y = W_out·h' + b_out`.
#[derive(Debug, Clone)]
pub struct RecurrentPredictor {
    weights: RecurrentWeights,
}

impl RecurrentPredictor {
    pub fn from_weights(weights: RecurrentWeights) -> Result<Self, PredictorError> {
        weights.validate()?;
        Ok(RecurrentPredictor { weights })
    }

    /// Load weights from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PredictorError> {
        let data = std::fs::read_to_string(path).map_err(|source| PredictorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let weights: RecurrentWeights = serde_json::from_str(&data)?;
        Self::from_weights(weights)
    }

    /// Untrained weights drawn uniformly from `±1/sqrt(hidden_size)`.
    ///
    /// Lets the pipeline run end to end without a checkpoint; the output is
    /// structured noise rather than music-shaped prediction.
    pub fn untrained(input_size: usize, hidden_size: usize, rng: &mut HarmoniaRng) -> Self {
        let bound = 1.0 / (hidden_size.max(1) as f32).sqrt();
        let mut draw = |n: usize| -> Vec<f32> {
            (0..n)
                .map(|_| (rng.next_f32() * 2.0 - 1.0) * bound)
                .collect()
        };
        let weights = RecurrentWeights {
            input_size,
            hidden_size,
            w_ih: draw(hidden_size * input_size),
            w_hh: draw(hidden_size * hidden_size),
            b_h: draw(hidden_size),
            w_out: draw(input_size * hidden_size),
            b_out: draw(input_size),
        };
        RecurrentPredictor { weights }
    }

    pub fn weights(&self) -> &RecurrentWeights {
        &self.weights
    }
}

/// `out[r] = bias[r] + Σ_c m[r, c] · v[c]` for a row-major `m`.
fn mat_vec_acc(m: &[f32], v: &[f32], out: &mut [f32]) {
    let cols = v.len();
    for (r, o) in out.iter_mut().enumerate() {
        let row = &m[r * cols..(r + 1) * cols];
        *o += row.iter().zip(v).map(|(a, b)| a * b).sum::<f32>();
    }
}

impl Predictor for RecurrentPredictor {
    type State = RecurrentState;

    fn band_count(&self) -> usize {
        self.weights.input_size
    }

    fn reset(&self) -> RecurrentState {
        RecurrentState(vec![0.0; self.weights.hidden_size])
    }

    fn step(
        &self,
        state: RecurrentState,
        input: &[f32],
    ) -> Result<(Vec<f32>, RecurrentState), PredictorError> {
        let w = &self.weights;
        if input.len() != w.input_size {
            return Err(PredictorError::InputWidth {
                expected: w.input_size,
                actual: input.len(),
            });
        }
        if state.0.len() != w.hidden_size {
            return Err(PredictorError::WeightShape {
                name: "hidden state",
                expected: w.hidden_size,
                actual: state.0.len(),
            });
        }

        let mut hidden = w.b_h.clone();
        mat_vec_acc(&w.w_ih, input, &mut hidden);
        mat_vec_acc(&w.w_hh, &state.0, &mut hidden);
        hidden.iter_mut().for_each(|h| *h = h.tanh());

        let mut output = w.b_out.clone();
        mat_vec_acc(&w.w_out, &hidden, &mut output);
        if let Some(bin) = output.iter().position(|v| !v.is_finite()) {
            return Err(PredictorError::NonFinite { bin });
        }
        Ok((output, RecurrentState(hidden)))
    }
}

/// Predicts the input row unchanged. Stateless.
#[derive(Debug, Clone, Copy)]
pub struct EchoPredictor {
    pub bands: usize,
}

impl Predictor for EchoPredictor {
    type State = ();

    fn band_count(&self) -> usize {
        self.bands
    }

    fn reset(&self) {}

    fn step(&self, _state: (), input: &[f32]) -> Result<(Vec<f32>, ()), PredictorError> {
        if input.len() != self.bands {
            return Err(PredictorError::InputWidth {
                expected: self.bands,
                actual: input.len(),
            });
        }
        Ok((input.to_vec(), ()))
    }
}

/// Always predicts the same row. Counts steps in its state.
#[derive(Debug, Clone)]
pub struct ConstantPredictor {
    pub row: Vec<f32>,
}

impl Predictor for ConstantPredictor {
    type State = usize;

    fn band_count(&self) -> usize {
        self.row.len()
    }

    fn reset(&self) -> usize {
        0
    }

    fn step(&self, steps: usize, input: &[f32]) -> Result<(Vec<f32>, usize), PredictorError> {
        if input.len() != self.row.len() {
            return Err(PredictorError::InputWidth {
                expected: self.row.len(),
                actual: input.len(),
            });
        }
        Ok((self.row.clone(), steps + 1))
    }
}
