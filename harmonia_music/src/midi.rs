// MIDI output for decoded chord tracks.
//
// `emit` validates a chord-event sequence and wraps it with a tempo into a
// `Track`. A Track serializes to a Standard MIDI File (SMF):
// - format 0, a single track, 480 ticks per quarter note
// - one tempo meta event at tick 0
// - every note on channel 0; note-on velocity from the chord event,
//   note-off velocity 64
// - events ordered by absolute tick, note-offs before note-ons at the same
//   tick so back-to-back chords sharing a pitch retrigger cleanly
//
// `NoteTimeline` parses SMF bytes back into absolute-tick note events, so
// an exported file can be checked against the track that produced it.
//
// Uses the `midly` crate for MIDI reading and writing.

use crate::error::TrackError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Velocity written on every note-off.
pub const NOTE_OFF_VELOCITY: u8 = 64;

const CHANNEL: u8 = 0;

/// One sounding pitch of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
}

/// A set of notes that start together and end together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub start_tick: i64,
    pub duration_ticks: i64,
    pub notes: Vec<Note>,
    /// Human-readable name ("Am", "Csus4"); informational only.
    #[serde(default)]
    pub symbol: String,
}

impl ChordEvent {
    pub fn end_tick(&self) -> i64 {
        self.start_tick + self.duration_ticks
    }
}

/// A validated chord sequence plus its tempo. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    tempo_bpm: u32,
    events: Vec<ChordEvent>,
}

/// Validate `events` and wrap them into a track.
pub fn emit(events: Vec<ChordEvent>, tempo_bpm: u32) -> Result<Track, TrackError> {
    if tempo_bpm == 0 {
        return Err(TrackError::InvalidTempo(tempo_bpm));
    }
    for (index, event) in events.iter().enumerate() {
        if event.notes.is_empty() {
            return Err(TrackError::EmptyChord { index });
        }
        if event.duration_ticks <= 0 {
            return Err(TrackError::NonPositiveDuration {
                index,
                duration: event.duration_ticks,
            });
        }
        if event.start_tick < 0 {
            return Err(TrackError::NegativeStart {
                index,
                start: event.start_tick,
            });
        }
        for note in &event.notes {
            if note.pitch > 127 {
                return Err(TrackError::PitchOutOfRange {
                    index,
                    pitch: note.pitch,
                });
            }
            if note.velocity == 0 || note.velocity > 127 {
                return Err(TrackError::VelocityOutOfRange {
                    index,
                    velocity: note.velocity,
                });
            }
        }
    }
    Ok(Track { tempo_bpm, events })
}

/// Whether a timeline entry starts or ends a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteKind {
    Off,
    On,
}

/// One note event at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimedNote {
    pub tick: u64,
    pub kind: NoteKind,
    pub pitch: u8,
    pub velocity: u8,
}

impl Track {
    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn events(&self) -> &[ChordEvent] {
        &self.events
    }

    /// Tick at which the last note ends.
    pub fn length_ticks(&self) -> i64 {
        self.events
            .iter()
            .map(ChordEvent::end_tick)
            .max()
            .unwrap_or(0)
    }

    /// Flatten to absolute-tick note events in file order.
    pub fn timeline(&self) -> NoteTimeline {
        let mut notes = Vec::with_capacity(self.events.iter().map(|e| e.notes.len() * 2).sum());
        for event in &self.events {
            // Validated by `emit`: start >= 0 and duration > 0.
            let on = event.start_tick as u64;
            let off = event.end_tick() as u64;
            for note in &event.notes {
                notes.push(TimedNote {
                    tick: on,
                    kind: NoteKind::On,
                    pitch: note.pitch,
                    velocity: note.velocity,
                });
                notes.push(TimedNote {
                    tick: off,
                    kind: NoteKind::Off,
                    pitch: note.pitch,
                    velocity: NOTE_OFF_VELOCITY,
                });
            }
        }
        // Stable: simultaneous notes keep chord order.
        notes.sort_by_key(|n| (n.tick, n.kind));
        NoteTimeline { notes }
    }

    /// Serialize to SMF bytes.
    pub fn to_smf_bytes(&self) -> Result<Vec<u8>, TrackError> {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
        ));

        let mut track: midly::Track<'static> = Vec::new();
        // Tempo meta holds 24 bits of microseconds per quarter.
        let tempo_microseconds = (60_000_000 / self.tempo_bpm).min(0xFF_FFFF);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        });

        let mut last_tick = 0u64;
        for note in self.timeline().notes {
            let gap = note.tick - last_tick;
            // Delta times are 28-bit; `u28::new` would drop the high bits.
            let delta = u32::try_from(gap)
                .ok()
                .filter(|&d| d <= u28::max_value().as_int())
                .ok_or(TrackError::TickGapTooLarge {
                    tick: note.tick,
                    gap,
                })?;
            let key = u7::new(note.pitch);
            let vel = u7::new(note.velocity);
            let message = match note.kind {
                NoteKind::On => MidiMessage::NoteOn { key, vel },
                NoteKind::Off => MidiMessage::NoteOff { key, vel },
            };
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::new(CHANNEL),
                    message,
                },
            });
            last_tick = note.tick;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);

        let mut buf = Vec::new();
        smf.write_std(&mut buf)?;
        Ok(buf)
    }

    /// Serialize and write to a file.
    pub fn write(&self, path: &Path) -> Result<(), TrackError> {
        let bytes = self.to_smf_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// SMF bytes, base64-encoded.
    pub fn to_base64(&self) -> Result<String, TrackError> {
        Ok(STANDARD.encode(self.to_smf_bytes()?))
    }
}

/// Note events of a parsed MIDI file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteTimeline {
    pub notes: Vec<TimedNote>,
}

impl NoteTimeline {
    /// Parse SMF bytes. Tempo and other meta events are skipped; a note-on
    /// with velocity 0 counts as a note-off.
    pub fn from_smf_bytes(bytes: &[u8]) -> Result<Self, TrackError> {
        let smf = Smf::parse(bytes)?;
        let mut notes = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                let TrackEventKind::Midi { message, .. } = event.kind else {
                    continue;
                };
                let (kind, key, vel) = match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                        (NoteKind::Off, key, vel)
                    }
                    MidiMessage::NoteOn { key, vel } => (NoteKind::On, key, vel),
                    MidiMessage::NoteOff { key, vel } => (NoteKind::Off, key, vel),
                    _ => continue,
                };
                notes.push(TimedNote {
                    tick,
                    kind,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                });
            }
        }
        Ok(NoteTimeline { notes })
    }

    /// Tempo of the first tempo meta event, in whole BPM.
    pub fn tempo_bpm(bytes: &[u8]) -> Result<Option<u32>, TrackError> {
        let smf = Smf::parse(bytes)?;
        Ok(smf.tracks.iter().flatten().find_map(|event| match event.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(us)) if us.as_int() > 0 => {
                Some((60_000_000 + us.as_int() / 2) / us.as_int())
            }
            _ => None,
        }))
    }
}
