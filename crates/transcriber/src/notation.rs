use melody_domain::{MidiNote, PitchEstimate};

/// A3; maps to note 57.
pub const REFERENCE_HZ: f64 = 220.0;
/// Offset added before rounding. The extra 0.01 is kept so existing
/// conversions produce identical note numbers.
pub const NOTE_OFFSET: f64 = 57.01;

/// `round(12 * log2(f / 220) + 57.01)`.
///
/// Non-finite or non-positive frequencies never reach the logarithm. Results
/// at or below zero are treated as no note, so MIDI note 0 is never produced.
pub fn frequency_to_note(frequency: f64) -> Option<MidiNote> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    let note = (12.0 * (frequency / REFERENCE_HZ).log2() + NOTE_OFFSET).round();
    if !note.is_finite() || note <= 0.0 || note > MidiNote::MAX as f64 {
        return None;
    }
    MidiNote::new(note as u8).ok()
}

pub fn notes_for(estimates: &[PitchEstimate]) -> Vec<Option<MidiNote>> {
    estimates
        .iter()
        .map(|estimate| estimate.frequency.and_then(|hz| frequency_to_note(hz as f64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(frequency: f64) -> Option<u8> {
        frequency_to_note(frequency).map(MidiNote::number)
    }

    #[test]
    fn reference_pitches() {
        assert_eq!(number(220.0), Some(57));
        assert_eq!(number(440.0), Some(69));
        assert_eq!(number(261.63), Some(60));
        assert_eq!(number(110.0), Some(45));
    }

    #[test]
    fn invalid_frequencies_have_no_note() {
        assert_eq!(number(0.0), None);
        assert_eq!(number(-220.0), None);
        assert_eq!(number(f64::NAN), None);
        assert_eq!(number(f64::INFINITY), None);
    }

    #[test]
    fn out_of_range_results_are_dropped_not_clamped() {
        // About 8.2 Hz lands on note 0, which is discarded.
        assert_eq!(number(8.18), None);
        assert_eq!(number(1.0), None);
        assert_eq!(number(8.7), Some(1));
        assert_eq!(number(30_000.0), None);
    }

    #[test]
    fn maps_estimates_in_order() {
        let estimates = vec![
            PitchEstimate {
                segment: 0,
                frequency: Some(440.0),
            },
            PitchEstimate::silent(1),
            PitchEstimate {
                segment: 2,
                frequency: Some(220.0),
            },
        ];
        let notes: Vec<Option<u8>> = notes_for(&estimates)
            .into_iter()
            .map(|n| n.map(MidiNote::number))
            .collect();
        assert_eq!(notes, vec![Some(69), None, Some(57)]);
    }
}
