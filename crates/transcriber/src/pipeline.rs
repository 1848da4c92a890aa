use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, instrument};

use melody_audio::AudioDecoder;
use melody_domain::{
    ConfigError, ConversionError, ConversionResult, ConversionSummary, PipelineConfig,
    PitchEstimate, SampleBuffer, Segment, SegmentSummary, Segmentation,
};

use crate::midi::NoteEventEmitter;
use crate::notation::notes_for;
use crate::pitch::{estimator_for, PitchEstimator};
use crate::segment::Segmenter;
use crate::tempo::BeatTracker;

/// Output of a successful run: the MIDI file and what went into it.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    #[serde(skip)]
    pub midi: Vec<u8>,
    pub summary: ConversionSummary,
}

/// Loader, beat tracker, segmenter, pitch estimator, note mapper and emitter
/// run in sequence. Holds no per-run state, so one instance can serve
/// concurrent conversions.
pub struct ConversionPipeline {
    config: PipelineConfig,
    decoder: AudioDecoder,
    beats: BeatTracker,
    segmenter: Segmenter,
    pitch: Box<dyn PitchEstimator>,
    emitter: NoteEventEmitter,
}

impl ConversionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let pitch = estimator_for(&config.pitch);
        Self::with_estimator(config, pitch)
    }

    /// Swaps in a custom pitch estimator, keeping the rest of the configuration.
    pub fn with_estimator(
        config: PipelineConfig,
        pitch: Box<dyn PitchEstimator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let emitter = NoteEventEmitter::new(config.midi.clone())?;
        Ok(Self::assemble(config, pitch, emitter))
    }

    fn assemble(
        config: PipelineConfig,
        pitch: Box<dyn PitchEstimator>,
        emitter: NoteEventEmitter,
    ) -> Self {
        Self {
            decoder: AudioDecoder::from_config(&config),
            beats: BeatTracker::new(config.beat.clone()),
            segmenter: Segmenter,
            emitter,
            pitch,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn estimator_name(&self) -> &'static str {
        self.pitch.name()
    }

    /// Converts uploaded audio to MIDI bytes. Any failure, including a panic
    /// inside a stage, is logged and reported as `None`.
    pub fn convert(&self, bytes: &[u8], extension: &str) -> Option<Vec<u8>> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_convert(bytes, extension)))
            .unwrap_or_else(|payload| Err(ConversionError::failure(panic_message(payload))));
        match outcome {
            Ok(conversion) => Some(conversion.midi),
            Err(err) => {
                error!(%extension, error = %err, "audio to midi conversion failed");
                None
            }
        }
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn try_convert(&self, bytes: &[u8], extension: &str) -> ConversionResult<Conversion> {
        let buffer = self.decoder.load(bytes, extension)?;
        info!(
            sample_rate = buffer.sample_rate(),
            channels = buffer.channels(),
            seconds = buffer.duration_secs(),
            "audio loaded"
        );
        self.convert_buffer(buffer)
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn convert_file<P: AsRef<Path>>(&self, path: P) -> ConversionResult<Conversion> {
        let buffer = self.decoder.open(path)?;
        self.convert_buffer(buffer)
    }

    /// Runs every stage after the loader.
    pub fn convert_buffer(&self, buffer: SampleBuffer) -> ConversionResult<Conversion> {
        let buffer = buffer.into_mono();
        let track = self.beats.estimate(&buffer)?;
        info!(tempo = track.tempo(), beats = track.len(), "beats tracked");

        let segments = match self.config.segmentation {
            Segmentation::Beats => self.segmenter.by_beats(&buffer, &track)?,
            Segmentation::Window { beats_per_window } => {
                self.segmenter
                    .by_tempo_window(&buffer, track.tempo(), beats_per_window)?
            }
        };

        let estimates = self.estimate_pitches(&segments);
        let notes = notes_for(&estimates);
        info!(
            segments = segments.len(),
            estimator = self.pitch.name(),
            pitched = notes.iter().filter(|n| n.is_some()).count(),
            "pitches mapped"
        );

        let entries: Vec<_> = notes
            .iter()
            .zip(&segments)
            .map(|(note, segment)| (*note, segment.anchor))
            .collect();
        let midi = self.emitter.emit(&entries, track.tempo())?;

        let summary = ConversionSummary {
            sample_rate: buffer.sample_rate(),
            duration_secs: buffer.duration_secs(),
            tempo_bpm: track.tempo(),
            beats: track.beats().to_vec(),
            segments: segments
                .iter()
                .zip(estimates.iter().zip(&notes))
                .map(|(segment, (estimate, note))| SegmentSummary {
                    index: segment.index,
                    start_time: segment.start_time,
                    duration: segment.duration,
                    frequency: estimate.frequency,
                    note: *note,
                })
                .collect(),
        };
        Ok(Conversion { midi, summary })
    }

    fn estimate_pitches(&self, segments: &[Segment<'_>]) -> Vec<PitchEstimate> {
        let estimate = |segment: &Segment<'_>| PitchEstimate {
            segment: segment.index,
            frequency: self.pitch.estimate(segment),
        };
        if self.config.parallel {
            segments.par_iter().map(estimate).collect()
        } else {
            segments.iter().map(estimate).collect()
        }
    }
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        let config = PipelineConfig::default();
        let pitch = estimator_for(&config.pitch);
        Self::assemble(config, pitch, NoteEventEmitter::default())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("pipeline stage panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::decode_notes;
    use crate::tempo::tests::pulsed_tone;
    use melody_audio::encode_wav;
    use melody_domain::PitchStrategy;

    struct Exploding;

    impl PitchEstimator for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn estimate(&self, _segment: &Segment<'_>) -> Option<f32> {
            panic!("estimator blew up")
        }
    }

    fn pulsed_wav() -> Vec<u8> {
        encode_wav(&pulsed_tone(22_050, 120.0, 2.0, 440.0)).unwrap()
    }

    #[test]
    fn pulsed_a4_becomes_note_69() {
        let pipeline = ConversionPipeline::default();
        let conversion = pipeline.try_convert(&pulsed_wav(), "wav").unwrap();

        let summary = &conversion.summary;
        assert!(!summary.beats.is_empty());
        let frames: f64 = summary.segments.iter().map(|s| s.duration).sum();
        assert!((frames - summary.duration_secs).abs() < 1e-9);
        for segment in &summary.segments {
            let hz = segment.frequency.unwrap();
            assert!((hz - 440.0).abs() < 15.0, "segment {} at {hz}", segment.index);
        }

        let decoded = decode_notes(&conversion.midi).unwrap();
        assert!(decoded.note_ons().any(|m| m.note == 69));
        assert_eq!(
            decoded.note_ons().count(),
            summary.note_count(),
        );
    }

    #[test]
    fn steady_a4_sine_becomes_note_69() {
        for sample_rate in [22_050u32, 44_100] {
            let samples = (0..sample_rate as usize * 2)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                })
                .collect();
            let wav = encode_wav(&SampleBuffer::mono(sample_rate, samples).unwrap()).unwrap();

            for strategy in [PitchStrategy::Centroid, PitchStrategy::Tracker] {
                let mut config = PipelineConfig::default();
                config.pitch.strategy = strategy;
                let conversion = ConversionPipeline::new(config)
                    .unwrap()
                    .try_convert(&wav, "wav")
                    .unwrap();

                let summary = &conversion.summary;
                assert!(!summary.beats.is_empty());
                let decoded = decode_notes(&conversion.midi).unwrap();
                let ons: Vec<u8> = decoded.note_ons().map(|m| m.note).collect();
                assert!(!ons.is_empty(), "{sample_rate} Hz {strategy:?}");
                assert!(
                    ons.iter().all(|n| *n == 69),
                    "{sample_rate} Hz {strategy:?}: {ons:?}"
                );
            }
        }
    }

    #[test]
    fn convert_returns_midi_bytes() {
        let midi = ConversionPipeline::default()
            .convert(&pulsed_wav(), "wav")
            .unwrap();
        assert!(midi.starts_with(b"MThd"));
    }

    #[test]
    fn sequential_and_parallel_runs_agree() {
        let bytes = pulsed_wav();
        let parallel = ConversionPipeline::default()
            .try_convert(&bytes, "wav")
            .unwrap();
        let config = PipelineConfig {
            parallel: false,
            ..PipelineConfig::default()
        };
        let sequential = ConversionPipeline::new(config)
            .unwrap()
            .try_convert(&bytes, "wav")
            .unwrap();
        assert_eq!(parallel.midi, sequential.midi);
        assert_eq!(parallel.summary, sequential.summary);
    }

    #[test]
    fn window_segmentation_and_tracker_find_a4() {
        let mut config = PipelineConfig::default();
        config.segmentation = Segmentation::Window {
            beats_per_window: 2.0,
        };
        config.pitch.strategy = PitchStrategy::Tracker;
        let pipeline = ConversionPipeline::new(config).unwrap();
        assert_eq!(pipeline.estimator_name(), "tracker");

        let conversion = pipeline.try_convert(&pulsed_wav(), "wav").unwrap();
        assert!(conversion.summary.notes().all(|n| n.number() == 69));
        assert!(conversion.summary.note_count() >= 1);
    }

    #[test]
    fn unsupported_and_undecodable_input_yield_none() {
        let pipeline = ConversionPipeline::default();
        assert_eq!(pipeline.convert(b"fLaC", "flac"), None);
        assert_eq!(pipeline.convert(&[0u8; 128], "mp3"), None);
        assert!(matches!(
            pipeline.try_convert(b"fLaC", "flac"),
            Err(ConversionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn silence_has_no_beats() {
        let silent = SampleBuffer::mono(22_050, vec![0.0; 44_100]).unwrap();
        let bytes = encode_wav(&silent).unwrap();
        let pipeline = ConversionPipeline::default();
        assert!(matches!(
            pipeline.try_convert(&bytes, "wav"),
            Err(ConversionError::NoBeatsDetected(_))
        ));
        assert_eq!(pipeline.convert(&bytes, "wav"), None);
    }

    #[test]
    fn stage_panic_is_reported_as_none() {
        let pipeline =
            ConversionPipeline::with_estimator(PipelineConfig::default(), Box::new(Exploding))
                .unwrap();
        assert_eq!(pipeline.convert(&pulsed_wav(), "wav"), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.midi.channel = 16;
        assert!(matches!(
            ConversionPipeline::new(config),
            Err(ConfigError::Validation(_))
        ));
    }
}
