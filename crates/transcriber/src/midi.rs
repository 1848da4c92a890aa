use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::Serialize;
use tracing::debug;

use melody_domain::{
    ConfigError, ConversionError, ConversionResult, MidiConfig, MidiNote, NoteEvent,
};

/// Largest delta a MIDI variable-length quantity can carry.
const MAX_DELTA: f64 = 0x0FFF_FFFF as f64;
/// Largest value of the 24-bit tempo meta field.
const MAX_TEMPO_MICROS: f64 = 0x00FF_FFFF as f64;

/// Note-on and note-off deltas for a segment time:
/// `floor` and `ceil` of `60000 / (tempo * segment_time)`.
pub fn delta_ticks(tempo: f64, segment_time: f64) -> ConversionResult<(u32, u32)> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(ConversionError::timing(format!("tempo {tempo} is not positive")));
    }
    if segment_time == 0.0 {
        return Err(ConversionError::timing("segment time is zero"));
    }
    if !segment_time.is_finite() || segment_time < 0.0 {
        return Err(ConversionError::timing(format!(
            "segment time {segment_time} is not a positive number"
        )));
    }
    let ticks = 60_000.0 / (tempo * segment_time);
    if !ticks.is_finite() || ticks.ceil() > MAX_DELTA {
        return Err(ConversionError::timing(format!(
            "segment time {segment_time} at {tempo} bpm overflows the tick range"
        )));
    }
    Ok((ticks.floor() as u32, ticks.ceil() as u32))
}

/// Microseconds per quarter note for a tempo meta event. Tempos too slow for
/// the 24-bit field are rejected.
pub fn tempo_micros(tempo: f64) -> ConversionResult<u32> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(ConversionError::timing(format!("tempo {tempo} is not positive")));
    }
    let micros = (60_000_000.0 / tempo).round();
    if micros < 1.0 || micros > MAX_TEMPO_MICROS {
        return Err(ConversionError::timing(format!(
            "tempo {tempo} bpm does not fit a MIDI tempo event"
        )));
    }
    Ok(micros as u32)
}

/// Builds the single-track MIDI file for a conversion.
#[derive(Debug, Clone, Default)]
pub struct NoteEventEmitter {
    config: MidiConfig,
}

impl NoteEventEmitter {
    pub fn new(config: MidiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Note events for every entry that carries a note, in input order.
    pub fn events(&self, entries: &[(Option<MidiNote>, f64)]) -> ConversionResult<Vec<NoteEvent>> {
        entries
            .iter()
            .filter_map(|(note, time)| {
                note.map(|n| {
                    NoteEvent::new(n, self.config.velocity, *time).map_err(ConversionError::from)
                })
            })
            .collect()
    }

    pub fn emit(&self, entries: &[(Option<MidiNote>, f64)], tempo: f64) -> ConversionResult<Vec<u8>> {
        let micros_per_beat = tempo_micros(tempo)?;
        for (_, time) in entries {
            delta_ticks(tempo, *time)?;
        }
        let events = self.events(entries)?;

        let channel = u4::new(self.config.channel);
        let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(events.len() * 2 + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat))),
        });

        for event in &events {
            let (on_delta, off_delta) = delta_ticks(tempo, event.time)?;
            let key = u7::new(event.note.number());
            let vel = u7::new(event.velocity);
            track.push(TrackEvent {
                delta: u28::new(on_delta),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                },
            });
            track.push(TrackEvent {
                delta: u28::new(off_delta),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff { key, vel },
                },
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header::new(
                Format::SingleTrack,
                Timing::Metrical(u15::new(self.config.ticks_per_beat)),
            ),
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes)
            .map_err(|e| ConversionError::failure(format!("failed to write MIDI data: {e:?}")))?;
        debug!(notes = events.len(), bytes = bytes.len(), "midi encoded");
        Ok(bytes)
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum NoteMessageKind {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct NoteMessage {
    pub kind: NoteMessageKind,
    pub note: u8,
    pub velocity: u8,
    /// Absolute tick from the start of the track.
    pub tick: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DecodedMidi {
    pub ticks_per_beat: Option<u16>,
    pub micros_per_beat: Option<u32>,
    pub messages: Vec<NoteMessage>,
}

impl DecodedMidi {
    pub fn note_ons(&self) -> impl Iterator<Item = &NoteMessage> {
        self.messages.iter().filter(|m| m.kind == NoteMessageKind::On)
    }
}

/// Reads note on/off messages back out of an encoded file.
pub fn decode_notes(bytes: &[u8]) -> ConversionResult<DecodedMidi> {
    let smf = Smf::parse(bytes)
        .map_err(|e| ConversionError::failure(format!("failed to parse MIDI data: {e}")))?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => Some(t.as_int()),
        Timing::Timecode(..) => None,
    };
    let mut micros_per_beat = None;
    let mut messages = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    micros_per_beat.get_or_insert(t.as_int());
                }
                TrackEventKind::Midi { message, .. } => {
                    let (kind, key, vel) = match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            (NoteMessageKind::On, key, vel)
                        }
                        MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => {
                            (NoteMessageKind::Off, key, vel)
                        }
                        _ => continue,
                    };
                    messages.push(NoteMessage {
                        kind,
                        note: key.as_int(),
                        velocity: vel.as_int(),
                        tick,
                    });
                }
                _ => {}
            }
        }
    }
    Ok(DecodedMidi {
        ticks_per_beat,
        micros_per_beat,
        messages,
    })
}
