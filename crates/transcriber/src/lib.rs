pub mod midi;
pub mod notation;
pub mod pipeline;
pub mod pitch;
pub mod segment;
pub mod tempo;

pub use midi::{decode_notes, delta_ticks, tempo_micros, DecodedMidi, NoteEventEmitter, NoteMessage};
pub use notation::frequency_to_note;
pub use pipeline::{Conversion, ConversionPipeline};
pub use pitch::{estimator_for, FrameTracker, PitchEstimator, SpectralCentroid};
pub use segment::Segmenter;
pub use tempo::BeatTracker;
