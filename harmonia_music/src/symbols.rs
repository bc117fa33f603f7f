// Chord-symbol helpers for the request surface.
//
// A deliberately coarse mapping between matrices and jazz chord names,
// separate from the chord decoder in decode.rs. The two do not share
// logic and give different answers for the same matrix:
//
// - `sequence_to_chord_symbols` samples a handful of timesteps and turns
//   the dominant band's mean energy into an index into a fixed vocabulary.
// - `chords_to_spectrogram` goes the other way for MIDI export: one block
//   of random per-bin energy per chord name, whatever the name.
// - `find_jazz_patterns` finds named progressions in a symbol list.

use crate::matrix::TimeFrequencyMatrix;
use harmonia_prng::HarmoniaRng;
use serde::{Deserialize, Serialize};

/// Symbol vocabulary indexed by energy. Repeats are intentional: common
/// chords get more of the index range.
pub const JAZZ_VOCABULARY: [&str; 22] = [
    "Cmaj7", "Dm7", "Em7", "Fmaj7", "G7", "Am7", "Bm7b5", "C7", "Dm7", "Em7", "F7", "Gm7", "Am7",
    "Bb7", "Cmaj7", "Dm7", "G7", "Cmaj7", "Fmaj7", "Dm7", "G7", "Cmaj7",
];

/// Bins in a spectrogram built from chord symbols.
pub const SYMBOL_SPECTROGRAM_BINS: usize = 36;

/// Timesteps per chord in a spectrogram built from chord symbols.
pub const STEPS_PER_SYMBOL: usize = 8;

/// Named progressions recognised by `find_jazz_patterns`, in report order.
pub const JAZZ_PATTERNS: [(&str, &[&str]); 6] = [
    ("ii-V-I", &["Dm7", "G7", "Cmaj7"]),
    ("I-vi-IV-V", &["Cmaj7", "Am7", "Fmaj7", "G7"]),
    ("I-IV-V-I", &["Cmaj7", "Fmaj7", "G7", "Cmaj7"]),
    ("vi-ii-V-I", &["Am7", "Dm7", "G7", "Cmaj7"]),
    ("iii-vi-ii-V", &["Em7", "Am7", "Dm7", "G7"]),
    ("I-vi-ii-V", &["Cmaj7", "Am7", "Dm7", "G7"]),
];

/// One occurrence of a named progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub start: usize,
    pub length: usize,
    pub chords: Vec<String>,
}

fn band_mean(row: &[f32], start: usize, end: usize) -> f64 {
    let band = &row[start.min(row.len())..end.min(row.len())];
    if band.is_empty() {
        return 0.0;
    }
    band.iter().map(|&v| f64::from(v)).sum::<f64>() / band.len() as f64
}

/// `length` chord symbols read off `sequence`.
///
/// Samples timesteps at stride `max(1, timesteps / length)`, clamped to the
/// last timestep. At each, compares the mean energy of bins 0..12, 12..24
/// and 24.. and indexes `JAZZ_VOCABULARY` with the dominant band's mean.
/// An empty sequence yields no symbols.
pub fn sequence_to_chord_symbols(sequence: &TimeFrequencyMatrix, length: usize) -> Vec<String> {
    let timesteps = sequence.timesteps();
    if timesteps == 0 {
        return Vec::new();
    }
    let stride = (timesteps / length.max(1)).max(1);
    let vocab = JAZZ_VOCABULARY.len() as i64;

    (0..length)
        .map(|i| {
            let row = sequence.row((i * stride).min(timesteps - 1));
            let low = band_mean(row, 0, 12);
            let mid = band_mean(row, 12, 24);
            let high = band_mean(row, 24, row.len());
            let dominant = if low > mid && low > high {
                low
            } else if mid > high {
                mid
            } else {
                high
            };
            let index = ((dominant * vocab as f64) as i64).rem_euclid(vocab);
            JAZZ_VOCABULARY[index as usize].to_string()
        })
        .collect()
}

/// A stand-in spectrogram for a chord list: `STEPS_PER_SYMBOL` timesteps per
/// chord, each block holding one random per-bin profile in [0.3, 0.8).
///
/// The chord names only set the length; their content is not read.
pub fn chords_to_spectrogram<S: AsRef<str>>(
    chords: &[S],
    rng: &mut HarmoniaRng,
) -> TimeFrequencyMatrix {
    let bins = SYMBOL_SPECTROGRAM_BINS;
    let mut data = Vec::with_capacity(chords.len() * STEPS_PER_SYMBOL * bins);
    for _ in chords {
        let profile: Vec<f32> = (0..bins).map(|_| rng.range_f32(0.3, 0.8)).collect();
        for _ in 0..STEPS_PER_SYMBOL {
            data.extend_from_slice(&profile);
        }
    }
    TimeFrequencyMatrix::from_flat_lossy(bins, data)
}

/// Every contiguous occurrence of each pattern in `JAZZ_PATTERNS`, grouped
/// by pattern and ordered by start within a pattern.
pub fn find_jazz_patterns<S: AsRef<str>>(chords: &[S]) -> Vec<PatternMatch> {
    let mut found = Vec::new();
    for (name, pattern) in JAZZ_PATTERNS {
        if chords.len() < pattern.len() {
            continue;
        }
        for (start, segment) in chords.windows(pattern.len()).enumerate() {
            let names = segment.iter().map(AsRef::<str>::as_ref);
            if names.eq(pattern.iter().copied()) {
                found.push(PatternMatch {
                    name: name.to_string(),
                    start,
                    length: pattern.len(),
                    chords: pattern.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
    }
    found
}
