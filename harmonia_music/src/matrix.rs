// The time-frequency matrix: the central numeric representation.
//
// A 2D grid of non-negative, energy-like magnitudes with axes
// (timestep, frequency bin). Storage is row-major by timestep: each row is
// one time slice of `bins` values. This is the layout the sequence model
// consumes (one row per step) and the layout the extender appends to.
//
// The chord decoder reads windows of rows and averages per bin; the quality
// scorer reads first differences along time. Both borrow the matrix
// immutably. Only `extend.rs` grows it, by appending whole rows.
//
// Reference data on disk is stored (bins, timesteps), so seed.rs builds
// matrices with `from_bin_major`.

use crate::error::MatrixError;
use serde::{Deserialize, Serialize};

/// A (timestep × bin) grid of magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixRepr", into = "MatrixRepr")]
pub struct TimeFrequencyMatrix {
    bins: usize,
    data: Vec<f32>,
}

/// On-disk JSON shape: explicit row list, validated on load.
#[derive(Serialize, Deserialize)]
struct MatrixRepr {
    bins: usize,
    rows: Vec<Vec<f32>>,
}

impl TryFrom<MatrixRepr> for TimeFrequencyMatrix {
    type Error = MatrixError;

    fn try_from(repr: MatrixRepr) -> Result<Self, Self::Error> {
        let mut matrix = TimeFrequencyMatrix::new(repr.bins)?;
        for row in &repr.rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }
}

impl From<TimeFrequencyMatrix> for MatrixRepr {
    fn from(matrix: TimeFrequencyMatrix) -> Self {
        MatrixRepr {
            bins: matrix.bins,
            rows: matrix.rows().map(<[f32]>::to_vec).collect(),
        }
    }
}

impl TimeFrequencyMatrix {
    /// An empty matrix (zero timesteps) with a fixed bin count.
    pub fn new(bins: usize) -> Result<Self, MatrixError> {
        if bins == 0 {
            return Err(MatrixError::NoBins);
        }
        Ok(TimeFrequencyMatrix {
            bins,
            data: Vec::new(),
        })
    }

    /// An all-zero matrix of the given shape.
    pub fn zeros(timesteps: usize, bins: usize) -> Result<Self, MatrixError> {
        if bins == 0 {
            return Err(MatrixError::NoBins);
        }
        Ok(TimeFrequencyMatrix {
            bins,
            data: vec![0.0; timesteps * bins],
        })
    }

    /// Build from a row-major buffer (`timesteps * bins` values).
    pub fn from_flat(bins: usize, data: Vec<f32>) -> Result<Self, MatrixError> {
        if bins == 0 {
            return Err(MatrixError::NoBins);
        }
        if data.len() % bins != 0 {
            return Err(MatrixError::Ragged {
                len: data.len(),
                bins,
            });
        }
        Ok(TimeFrequencyMatrix { bins, data })
    }

    /// Like `from_flat`, but infallible: a zero bin count becomes one and a
    /// trailing partial row is dropped.
    pub fn from_flat_lossy(bins: usize, mut data: Vec<f32>) -> Self {
        let bins = bins.max(1);
        data.truncate(data.len() - data.len() % bins);
        TimeFrequencyMatrix { bins, data }
    }

    /// Build from one row per timestep. All rows must share a width.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, MatrixError> {
        let bins = rows.first().map_or(0, Vec::len);
        let mut matrix = TimeFrequencyMatrix::new(bins)?;
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Build from a bin-major buffer laid out (bins, timesteps), the layout
    /// used by stored reference spectrograms. Transposes into row-major.
    pub fn from_bin_major(
        bins: usize,
        timesteps: usize,
        values: &[f32],
    ) -> Result<Self, MatrixError> {
        if bins == 0 {
            return Err(MatrixError::NoBins);
        }
        if values.len() != bins * timesteps {
            return Err(MatrixError::Ragged {
                len: values.len(),
                bins,
            });
        }
        let mut data = vec![0.0; bins * timesteps];
        for b in 0..bins {
            for t in 0..timesteps {
                data[t * bins + b] = values[b * timesteps + t];
            }
        }
        Ok(TimeFrequencyMatrix { bins, data })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn timesteps(&self) -> usize {
        self.data.len() / self.bins
    }

    /// (timesteps, bins).
    pub fn shape(&self) -> (usize, usize) {
        (self.timesteps(), self.bins)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The row at timestep `t`. Panics if out of range.
    pub fn row(&self, t: usize) -> &[f32] {
        &self.data[t * self.bins..(t + 1) * self.bins]
    }

    pub fn last_row(&self) -> Option<&[f32]> {
        let n = self.timesteps();
        if n == 0 { None } else { Some(self.row(n - 1)) }
    }

    pub fn get(&self, t: usize, bin: usize) -> f32 {
        self.data[t * self.bins + bin]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.bins)
    }

    /// All values in row-major order.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Append one timestep.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), MatrixError> {
        if row.len() != self.bins {
            return Err(MatrixError::RowWidth {
                row: self.timesteps(),
                expected: self.bins,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Reserve room for `additional` more timesteps.
    pub fn reserve_rows(&mut self, additional: usize) {
        self.data.reserve(additional * self.bins);
    }

    /// Per-bin mean over timesteps `[start, end)`. `end` is clamped to the
    /// matrix length; an empty range yields all zeros.
    pub fn window_bin_means(&self, start: usize, end: usize) -> Vec<f64> {
        let end = end.min(self.timesteps());
        let mut sums = vec![0.0f64; self.bins];
        if start >= end {
            return sums;
        }
        for t in start..end {
            for (sum, &v) in sums.iter_mut().zip(self.row(t)) {
                *sum += v as f64;
            }
        }
        let n = (end - start) as f64;
        sums.iter_mut().for_each(|s| *s /= n);
        sums
    }

    /// Per-bin mean over the whole time axis.
    pub fn bin_means(&self) -> Vec<f64> {
        self.window_bin_means(0, self.timesteps())
    }

    /// First differences along time: row `t` of the result is
    /// `row(t + 1) - row(t)`. Has one fewer timestep than `self`.
    pub fn time_diff(&self) -> TimeFrequencyMatrix {
        let n = self.timesteps();
        let mut data = Vec::with_capacity(n.saturating_sub(1) * self.bins);
        for t in 1..n {
            let (prev, cur) = (self.row(t - 1), self.row(t));
            data.extend(cur.iter().zip(prev).map(|(c, p)| c - p));
        }
        TimeFrequencyMatrix {
            bins: self.bins,
            data,
        }
    }
}
