// Seed provider: the matrix that bootstraps every generation attempt.
//
// Prefers a real excerpt: pick a random entry from the reference catalog,
// load its stored spectrogram, and cut a contiguous window of the requested
// length (zero-padding at the end when the reference is too short). Any
// failure along the way (no catalog, unreadable file, malformed index,
// unsupported matrix format) is logged and absorbed; the provider then
// returns low-amplitude Gaussian noise of the requested shape. `get_seed`
// itself cannot fail.
//
// Catalog format: CSV with a header line. The third column of each row is
// the path of a stored matrix, relative to the catalog's directory unless
// absolute. Stored matrices are laid out (bins, timesteps), as `.npy`
// (`<f4`/`<f8`) or JSON `{"bins": [[...], ...]}`.
//
// The catalog is passed in explicitly (by path or already loaded), never
// read from ambient global state. Files are opened in a scope that closes
// them on every exit path.

use crate::error::SeedError;
use crate::matrix::TimeFrequencyMatrix;
use crate::npy::{NpyError, read_npy};
use harmonia_prng::HarmoniaRng;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Standard deviation of the synthetic fallback seed.
pub const SYNTHETIC_AMPLITUDE: f64 = 0.1;

/// Column of the catalog holding the matrix path.
const PATH_COLUMN: usize = 2;

/// One catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub path: PathBuf,
}

/// An index of stored reference spectrograms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceCatalog {
    pub entries: Vec<CatalogEntry>,
}

impl ReferenceCatalog {
    /// Load a CSV catalog from disk.
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let catalog = Self::parse(&text, base)?;
        if catalog.entries.is_empty() {
            return Err(SeedError::EmptyCatalog(path.to_path_buf()));
        }
        Ok(catalog)
    }

    /// Parse CSV text. Relative matrix paths resolve against `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Self, SeedError> {
        let mut entries = Vec::new();
        // Line 1 is the header.
        for (i, line) in text.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let columns: Vec<&str> = line.split(',').map(str::trim).collect();
            let Some(raw_path) = columns.get(PATH_COLUMN).filter(|p| !p.is_empty()) else {
                return Err(SeedError::MalformedCatalog {
                    line: i + 1,
                    reason: format!("expected at least {} columns", PATH_COLUMN + 1),
                });
            };
            let raw_path = Path::new(raw_path);
            let path = if raw_path.is_absolute() {
                raw_path.to_path_buf()
            } else {
                base.join(raw_path)
            };
            entries.push(CatalogEntry {
                id: columns[0].to_string(),
                path,
            });
        }
        Ok(ReferenceCatalog { entries })
    }
}

/// JSON reference layout: one list per bin.
#[derive(Deserialize)]
struct JsonReference {
    bins: Vec<Vec<f32>>,
}

fn malformed(path: &Path, reason: impl ToString) -> SeedError {
    SeedError::MalformedMatrix {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Load a stored (bins, timesteps) matrix.
pub fn load_reference(path: &Path) -> Result<TimeFrequencyMatrix, SeedError> {
    let io_err = |source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    };
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "npy" => {
            let file = File::open(path).map_err(io_err)?;
            let array = read_npy(&mut BufReader::new(file)).map_err(|e| match e {
                NpyError::Io(source) => SeedError::Io {
                    path: path.to_path_buf(),
                    source,
                },
                other => malformed(path, other),
            })?;
            let [bins, timesteps] = array.shape[..] else {
                return Err(malformed(path, format!("expected 2-D array, got {:?}", array.shape)));
            };
            TimeFrequencyMatrix::from_bin_major(bins, timesteps, &array.data)
                .map_err(|e| malformed(path, e))
        }
        "json" => {
            let file = File::open(path).map_err(io_err)?;
            let parsed = serde_json::from_reader::<_, JsonReference>(BufReader::new(file));
            let reference = parsed.map_err(|e| malformed(path, e))?;
            let bins = reference.bins.len();
            let timesteps = reference.bins.first().map_or(0, Vec::len);
            if reference.bins.iter().any(|b| b.len() != timesteps) {
                return Err(malformed(path, "bins have differing lengths"));
            }
            let flat: Vec<f32> = reference.bins.into_iter().flatten().collect();
            TimeFrequencyMatrix::from_bin_major(bins, timesteps, &flat)
                .map_err(|e| malformed(path, e))
        }
        _ => Err(SeedError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Cut `target_length` timesteps from `reference` and conform it to
/// `band_count` bins.
///
/// A reference longer than the target yields a random contiguous window;
/// otherwise the whole reference is used and zero-padded at the end. Extra
/// bins are dropped, missing bins are zero.
pub fn window_from_reference(
    reference: &TimeFrequencyMatrix,
    target_length: usize,
    band_count: usize,
    rng: &mut HarmoniaRng,
) -> TimeFrequencyMatrix {
    let band_count = band_count.max(1);
    let available = reference.timesteps();
    let start = if available > target_length {
        rng.range_usize_inclusive(0, available - target_length)
    } else {
        0
    };
    let copied = available.min(target_length);
    let keep = reference.bins().min(band_count);

    let mut data = vec![0.0f32; target_length * band_count];
    for t in 0..copied {
        let src = &reference.row(start + t)[..keep];
        data[t * band_count..t * band_count + keep].copy_from_slice(src);
    }
    TimeFrequencyMatrix::from_flat_lossy(band_count, data)
}

/// Gaussian noise, mean 0, standard deviation `amplitude`.
pub fn synthetic_seed(
    target_length: usize,
    band_count: usize,
    amplitude: f64,
    rng: &mut HarmoniaRng,
) -> TimeFrequencyMatrix {
    let bins = band_count.max(1);
    let data = (0..target_length * bins)
        .map(|_| rng.gaussian(0.0, amplitude) as f32)
        .collect();
    TimeFrequencyMatrix::from_flat_lossy(bins, data)
}

/// Where real seed data comes from.
#[derive(Debug, Clone, Default)]
pub enum SeedSource {
    /// Synthetic noise only.
    #[default]
    Synthetic,
    /// A CSV catalog on disk, re-read on every request.
    CatalogFile(PathBuf),
    /// An already-loaded catalog.
    Catalog(ReferenceCatalog),
}

/// Supplies bootstrap matrices for generation attempts.
#[derive(Debug, Clone)]
pub struct SeedProvider {
    source: SeedSource,
    amplitude: f64,
}

impl Default for SeedProvider {
    fn default() -> Self {
        SeedProvider::new(SeedSource::Synthetic)
    }
}

impl SeedProvider {
    pub fn new(source: SeedSource) -> Self {
        SeedProvider {
            source,
            amplitude: SYNTHETIC_AMPLITUDE,
        }
    }

    /// Provider backed by a catalog file, or synthetic-only for `None`.
    pub fn from_catalog_path(path: Option<PathBuf>) -> Self {
        SeedProvider::new(path.map_or(SeedSource::Synthetic, SeedSource::CatalogFile))
    }

    pub fn source(&self) -> &SeedSource {
        &self.source
    }

    /// A (target_length × band_count) seed. Never fails.
    ///
    /// A `band_count` of zero is treated as one bin, the smallest valid
    /// matrix.
    pub fn get_seed(
        &self,
        target_length: usize,
        band_count: usize,
        rng: &mut HarmoniaRng,
    ) -> TimeFrequencyMatrix {
        let bins = band_count.max(1);
        match self.real_seed(target_length, bins, rng) {
            Ok(seed) => seed,
            Err(SeedError::NoCatalog) => synthetic_seed(target_length, bins, self.amplitude, rng),
            Err(err) => {
                warn!(error = %err, "real seed unavailable, using synthetic noise");
                synthetic_seed(target_length, bins, self.amplitude, rng)
            }
        }
    }

    /// Try to cut a seed from the reference catalog.
    pub fn real_seed(
        &self,
        target_length: usize,
        band_count: usize,
        rng: &mut HarmoniaRng,
    ) -> Result<TimeFrequencyMatrix, SeedError> {
        let loaded;
        let catalog = match &self.source {
            SeedSource::Synthetic => return Err(SeedError::NoCatalog),
            SeedSource::Catalog(catalog) => catalog,
            SeedSource::CatalogFile(path) => {
                loaded = ReferenceCatalog::load(path)?;
                &loaded
            }
        };
        let entry = rng
            .choose(&catalog.entries)
            .ok_or_else(|| SeedError::EmptyCatalog(PathBuf::new()))?;
        let reference = load_reference(&entry.path)?;
        debug!(
            id = %entry.id,
            timesteps = reference.timesteps(),
            bins = reference.bins(),
            "loaded reference seed"
        );
        Ok(window_from_reference(&reference, target_length, band_count, rng))
    }
}
