// Chord decoder: time-frequency matrix → timed chord events.
//
// Walks the matrix in non-overlapping windows of `window_steps` timesteps
// (the final window may be shorter and is still decoded). For each window:
//
//   1. Per-bin mean energy over the window.
//   2. Root bin: strongest bin in the low band (first 30% of bins) unless
//      the strongest mid-band bin (30%..60%) is at least as strong after a
//      1.2× bias toward the low band. Bins map linearly onto pitches 48..=84.
//   3. Progression: every `chords_per_pattern` windows the decoder moves to
//      the next pattern of `PROGRESSION_PATTERNS` and restarts it. The
//      current degree's semitone offset is added to the root, which is then
//      folded into the octave above `min_pitch`.
//   4. Quality: the triad whose three pitches land on the most window energy
//      (nearest bin per pitch). Ties go to the earlier quality.
//   5. Voicing: a bass note an octave down (floored at 24), the triad, and
//      sometimes a seventh above the root.
//   6. Velocity from the window's overall energy, jittered per note; duration
//      from the nominal window length, jittered per chord.
//
// Chords are laid back to back: each starts on the tick where the previous
// one ended, so duration jitter shifts later chords too.
//
// Every random draw comes from the caller's `HarmoniaRng`. Draw order per
// window: extension coin, one velocity jitter per note, duration jitter.
//
// This is the only path from a generated matrix to playable notes. The
// symbol helpers in symbols.rs are a separate, much coarser heuristic.

use crate::error::TrackError;
use crate::matrix::TimeFrequencyMatrix;
use crate::midi::{ChordEvent, Note, Track, emit};
use crate::progression::{ChordQuality, DEGREE_OFFSETS, PROGRESSION_PATTERNS, pitch_name};
use harmonia_prng::HarmoniaRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decoder constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParams {
    /// Timesteps per chord window.
    pub window_steps: usize,
    /// Nominal ticks per timestep.
    pub ticks_per_step: i64,
    /// Windows decoded before moving to the next progression pattern.
    pub chords_per_pattern: usize,
    /// Fraction of bins in the low band.
    pub low_band_fraction: f64,
    /// Upper edge of the mid band as a fraction of bins.
    pub mid_band_fraction: f64,
    /// Low-band winner must exceed the mid-band winner by this factor.
    pub root_bias: f64,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub bass_floor: u8,
    pub extension_probability: f64,
    /// Semitones above the root of the optional extension note.
    pub extension_interval: u8,
    pub velocity_base: f64,
    pub velocity_scale: f64,
    pub velocity_spread: i64,
    pub velocity_min: u8,
    pub velocity_max: u8,
    pub duration_jitter: i64,
    pub min_duration_ticks: i64,
}

impl Default for DecoderParams {
    fn default() -> Self {
        DecoderParams {
            window_steps: 4,
            ticks_per_step: 120,
            chords_per_pattern: 8,
            low_band_fraction: 0.3,
            mid_band_fraction: 0.6,
            root_bias: 1.2,
            min_pitch: 48,
            max_pitch: 84,
            bass_floor: 24,
            extension_probability: 0.4,
            extension_interval: 10,
            velocity_base: 70.0,
            velocity_scale: 20.0,
            velocity_spread: 15,
            velocity_min: 40,
            velocity_max: 120,
            duration_jitter: 20,
            min_duration_ticks: 60,
        }
    }
}

impl DecoderParams {
    /// Reject parameter sets the decoder cannot honour, naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_steps == 0 {
            return Err("decoder window must be at least one timestep".to_string());
        }
        let nominal = i64::try_from(self.window_steps)
            .ok()
            .and_then(|w| w.checked_mul(self.ticks_per_step));
        if self.ticks_per_step <= 0 || nominal.is_none_or(|t| t > i64::from(i32::MAX)) {
            return Err(format!(
                "ticks per step {} must be positive and keep a window within {} ticks",
                self.ticks_per_step,
                i32::MAX
            ));
        }
        for (name, fraction) in [
            ("low_band_fraction", self.low_band_fraction),
            ("mid_band_fraction", self.mid_band_fraction),
            ("extension_probability", self.extension_probability),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(format!("{name} must be within [0, 1], got {fraction}"));
            }
        }
        if !self.root_bias.is_finite() || self.root_bias < 0.0 {
            return Err(format!(
                "root bias must be finite and non-negative, got {}",
                self.root_bias
            ));
        }
        if self.min_pitch > self.max_pitch || self.max_pitch > 127 || self.bass_floor > 127 {
            return Err(format!(
                "pitch range {}..={} (bass floor {}) must be ordered and within 0..=127",
                self.min_pitch, self.max_pitch, self.bass_floor
            ));
        }
        if !self.velocity_base.is_finite() || !self.velocity_scale.is_finite() {
            return Err("velocity base and scale must be finite".to_string());
        }
        if self.velocity_min == 0
            || self.velocity_min > self.velocity_max
            || self.velocity_max > 127
        {
            return Err(format!(
                "velocity range {}..={} must be ordered and within 1..=127",
                self.velocity_min, self.velocity_max
            ));
        }
        if !(0..=127).contains(&self.velocity_spread) {
            return Err(format!(
                "velocity spread must be within 0..=127, got {}",
                self.velocity_spread
            ));
        }
        if !(0..=i64::from(i32::MAX)).contains(&self.duration_jitter)
            || self.min_duration_ticks > i64::from(i32::MAX)
        {
            return Err(format!(
                "duration jitter {} must be non-negative and minimum duration {} at most {}",
                self.duration_jitter,
                self.min_duration_ticks,
                i32::MAX
            ));
        }
        Ok(())
    }
}

/// Maps frequency bins onto MIDI pitches, spread evenly over
/// `min_pitch..=max_pitch`.
#[derive(Debug, Clone)]
struct PitchMap {
    pitches: Vec<i32>,
}

impl PitchMap {
    fn new(bins: usize, min_pitch: u8, max_pitch: u8) -> Self {
        let lo = i64::from(min_pitch);
        let span = i64::from(max_pitch) - lo;
        let pitches = (0..bins)
            .map(|i| {
                if bins <= 1 {
                    lo as i32
                } else {
                    (lo + (i as i64 * span).div_euclid(bins as i64 - 1)) as i32
                }
            })
            .collect();
        PitchMap { pitches }
    }

    fn pitch(&self, bin: usize) -> i32 {
        self.pitches[bin]
    }

    /// First bin whose pitch is closest to `target`.
    fn nearest_bin(&self, target: i32) -> usize {
        let mut best = 0;
        let mut best_dist = i32::MAX;
        for (bin, &p) in self.pitches.iter().enumerate() {
            let dist = (p - target).abs();
            if dist < best_dist {
                best = bin;
                best_dist = dist;
            }
        }
        best
    }
}

/// Index and value of the first maximum, `None` for an empty slice.
fn strongest(energy: &[f64]) -> Option<(usize, f64)> {
    energy
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, e)| match best {
            Some((_, b)) if e <= b => best,
            _ => Some((i, e)),
        })
}

/// Bin chosen as the chord root for one window's energy profile.
fn root_bin(energy: &[f64], params: &DecoderParams) -> usize {
    let bins = energy.len();
    let low_end = ((params.low_band_fraction * bins as f64) as usize).clamp(1, bins);
    let mid_end = ((params.mid_band_fraction * bins as f64) as usize)
        .max(low_end + 1)
        .min(bins);
    let (low_bin, low_e) = strongest(&energy[..low_end]).unwrap_or((0, 0.0));
    match strongest(&energy[low_end..mid_end]) {
        Some((mid_bin, mid_e)) if low_e <= mid_e * params.root_bias => low_end + mid_bin,
        _ => low_bin,
    }
}

/// Best-fitting triad for `root` against the window energy.
fn choose_quality(root: i32, energy: &[f64], map: &PitchMap) -> ChordQuality {
    let fit = |quality: ChordQuality| -> f64 {
        quality
            .intervals()
            .iter()
            .map(|&iv| energy[map.nearest_bin(root + i32::from(iv))])
            .sum()
    };
    let mut best = ChordQuality::ALL[0];
    let mut best_fit = fit(best);
    for &quality in &ChordQuality::ALL[1..] {
        let f = fit(quality);
        if f > best_fit {
            best = quality;
            best_fit = f;
        }
    }
    best
}

/// Position within the progression catalog.
#[derive(Debug, Clone, Copy, Default)]
struct PatternCursor {
    pattern: usize,
    position: usize,
}

impl PatternCursor {
    /// Degree for the window starting at timestep `start`.
    fn next_degree(&mut self, start: usize, span: usize) -> u8 {
        if start % span == 0 {
            self.pattern = (self.pattern + 1) % PROGRESSION_PATTERNS.len();
            self.position = 0;
        }
        let degree = PROGRESSION_PATTERNS[self.pattern].degree_at(self.position);
        self.position += 1;
        degree
    }
}

/// Decode `sequence` into chord events, back to back from tick 0.
pub fn decode_events(
    sequence: &TimeFrequencyMatrix,
    params: &DecoderParams,
    rng: &mut HarmoniaRng,
) -> Vec<ChordEvent> {
    let window = params.window_steps.max(1);
    let pattern_span = window * params.chords_per_pattern.max(1);
    let map = PitchMap::new(sequence.bins(), params.min_pitch, params.max_pitch);
    let min_pitch = i32::from(params.min_pitch);
    let max_pitch = i32::from(params.max_pitch);
    let nominal_ticks = window as i64 * params.ticks_per_step;

    let mut cursor = PatternCursor::default();
    let mut events = Vec::with_capacity(sequence.timesteps().div_ceil(window));
    let mut tick = 0i64;

    for start in (0..sequence.timesteps()).step_by(window) {
        let end = (start + window).min(sequence.timesteps());
        let energy = sequence.window_bin_means(start, end);

        let detected = map.pitch(root_bin(&energy, params));
        let degree = cursor.next_degree(start, pattern_span);
        let offset = i32::from(DEGREE_OFFSETS[usize::from(degree) % DEGREE_OFFSETS.len()]);
        let root = (detected + offset).rem_euclid(12) + min_pitch;

        let quality = choose_quality(root, &energy, &map);

        let octaves_down = ((root - min_pitch).div_euclid(12)).max(1);
        let bass = (root - 12 * octaves_down).max(i32::from(params.bass_floor));
        let mut pitches = vec![bass];
        pitches.extend(quality.intervals().iter().map(|&iv| root + i32::from(iv)));
        if rng.next_f64() > 1.0 - params.extension_probability {
            let extension = root + i32::from(params.extension_interval);
            if extension <= max_pitch {
                pitches.push(extension);
            }
        }

        let mean_energy = if energy.is_empty() {
            0.0
        } else {
            energy.iter().sum::<f64>() / energy.len() as f64
        };
        let base_velocity = (params.velocity_base + params.velocity_scale * mean_energy) as i64;
        let notes = pitches
            .iter()
            .map(|&p| {
                let spread = params.velocity_spread;
                let jitter = rng.range_i64_inclusive(-spread, spread);
                let velocity = (base_velocity + jitter)
                    .clamp(i64::from(params.velocity_min), i64::from(params.velocity_max));
                Note {
                    pitch: p.clamp(0, 127) as u8,
                    velocity: velocity.clamp(1, 127) as u8,
                }
            })
            .collect();

        let spread = params.duration_jitter;
        let jitter = rng.range_i64_inclusive(-spread, spread);
        let duration = (nominal_ticks + jitter).max(params.min_duration_ticks).max(1);
        let symbol = format!("{}{}", pitch_name(root as u8), quality.suffix());

        debug!(
            start,
            end,
            root,
            degree,
            chord = %symbol,
            duration,
            "decoded window"
        );
        events.push(ChordEvent {
            start_tick: tick,
            duration_ticks: duration,
            notes,
            symbol,
        });
        tick += duration;
    }
    events
}

/// Decode `sequence` into a validated track at `tempo_bpm`.
pub fn decode(
    sequence: &TimeFrequencyMatrix,
    tempo_bpm: u32,
    params: &DecoderParams,
    rng: &mut HarmoniaRng,
) -> Result<Track, TrackError> {
    emit(decode_events(sequence, params, rng), tempo_bpm)
}
