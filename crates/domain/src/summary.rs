use serde::{Deserialize, Serialize};

use crate::events::MidiNote;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SegmentSummary {
    pub index: usize,
    pub start_time: f64,
    pub duration: f64,
    pub frequency: Option<f32>,
    pub note: Option<MidiNote>,
}

/// What a conversion found, without the MIDI bytes themselves.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversionSummary {
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub tempo_bpm: f64,
    pub beats: Vec<f64>,
    pub segments: Vec<SegmentSummary>,
}

impl ConversionSummary {
    pub fn note_count(&self) -> usize {
        self.segments.iter().filter(|s| s.note.is_some()).count()
    }

    pub fn notes(&self) -> impl Iterator<Item = MidiNote> + '_ {
        self.segments.iter().filter_map(|s| s.note)
    }
}
