use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A MIDI note number in `0..=127`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct MidiNote(u8);

impl MidiNote {
    pub const MAX: u8 = 127;

    pub fn new(number: u8) -> Result<Self, DomainError> {
        if number > Self::MAX {
            return Err(DomainError::validation(format!(
                "midi note {number} is above {}",
                Self::MAX
            )));
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Scientific pitch name, e.g. `A4` for note 69.
    pub fn name(self) -> String {
        let octave = (self.0 as i32 / 12) - 1;
        format!("{}{}", NOTE_NAMES[(self.0 % 12) as usize], octave)
    }
}

impl TryFrom<u8> for MidiNote {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MidiNote> for u8 {
    fn from(note: MidiNote) -> Self {
        note.0
    }
}

impl fmt::Display for MidiNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Dominant frequency estimated for one segment; `None` means no pitch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitchEstimate {
    pub segment: usize,
    pub frequency: Option<f32>,
}

impl PitchEstimate {
    pub fn silent(segment: usize) -> Self {
        Self {
            segment,
            frequency: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct NoteEvent {
    pub note: MidiNote,
    pub velocity: u8,
    /// Segment time in seconds the tick delta is computed from.
    pub time: f64,
}

impl NoteEvent {
    pub fn new(note: MidiNote, velocity: u8, time: f64) -> Result<Self, DomainError> {
        if velocity > MidiNote::MAX {
            return Err(DomainError::validation(format!(
                "velocity {velocity} is above {}",
                MidiNote::MAX
            )));
        }
        Ok(Self {
            note,
            velocity,
            time,
        })
    }
}
