// Harmonic constant tables.
//
// The chord decoder walks a fixed catalog of progression patterns, each an
// ordered cycle of major-scale degrees (0 = I … 6 = vii). Degrees map to
// semitone offsets through `DEGREE_OFFSETS`. Chord qualities are the four
// triad shapes the decoder fits against window energy.
//
// All tables are process-wide constants; nothing here is mutated at runtime.

/// A named cycle of scale degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionPattern {
    pub name: &'static str,
    pub degrees: &'static [u8],
}

impl ProgressionPattern {
    /// Degree at a position, wrapping within the pattern.
    pub fn degree_at(&self, position: usize) -> u8 {
        self.degrees[position % self.degrees.len()]
    }
}

/// The pattern catalog, in cycling order.
pub const PROGRESSION_PATTERNS: [ProgressionPattern; 5] = [
    ProgressionPattern {
        name: "I-vi-IV-V",
        degrees: &[0, 5, 3, 4],
    },
    ProgressionPattern {
        name: "I-iii-vi-I",
        degrees: &[0, 2, 5, 0],
    },
    ProgressionPattern {
        name: "I-V-iii-vi",
        degrees: &[0, 4, 2, 5],
    },
    ProgressionPattern {
        name: "I-IV-V-I",
        degrees: &[0, 3, 4, 0],
    },
    ProgressionPattern {
        name: "I-vi-iii-V",
        degrees: &[0, 5, 2, 4],
    },
];

/// Semitone offset of each major-scale degree: I, ii, iii, IV, V, vi, vii.
pub const DEGREE_OFFSETS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Triad shapes the decoder chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Sus2,
    Sus4,
}

impl ChordQuality {
    /// Candidate order. Ties in the fit score go to the earlier entry.
    pub const ALL: [ChordQuality; 4] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Sus2,
        ChordQuality::Sus4,
    ];

    /// Semitones above the root.
    pub fn intervals(self) -> [u8; 3] {
        match self {
            ChordQuality::Major => [0, 4, 7],
            ChordQuality::Minor => [0, 3, 7],
            ChordQuality::Sus2 => [0, 2, 7],
            ChordQuality::Sus4 => [0, 5, 7],
        }
    }

    /// Suffix used in chord symbols ("" for major).
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
        }
    }
}

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch-class name, sharps for black keys.
pub fn pitch_name(pitch: u8) -> &'static str {
    PITCH_NAMES[usize::from(pitch % 12)]
}
