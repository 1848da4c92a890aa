pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod io;
pub mod summary;
pub mod tempo;

pub use crate::buffer::{SampleBuffer, Segment};
pub use crate::config::{
    BeatConfig, ConfigError, MidiConfig, PipelineConfig, PitchConfig, PitchStrategy, Segmentation,
};
pub use crate::error::{ConversionError, ConversionResult, DomainError};
pub use crate::events::{MidiNote, NoteEvent, PitchEstimate};
pub use crate::format::AudioFormat;
pub use crate::io::{ExportFormat, JsonExporter, SummaryExporter, YamlExporter};
pub use crate::summary::{ConversionSummary, SegmentSummary};
pub use crate::tempo::BeatTrack;
