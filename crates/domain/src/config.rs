use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::AudioFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

impl ConfigError {
    fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}

/// Settings for one conversion pipeline. Every field has a default, so an
/// empty YAML document is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub allowed_extensions: Vec<AudioFormat>,
    pub beat: BeatConfig,
    pub segmentation: Segmentation,
    pub pitch: PitchConfig,
    pub midi: MidiConfig,
    /// Estimate segment pitches on the rayon thread pool.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: AudioFormat::ALL.to_vec(),
            beat: BeatConfig::default(),
            segmentation: Segmentation::default(),
            pitch: PitchConfig::default(),
            midi: MidiConfig::default(),
            parallel: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeatConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Used when the onset envelope shows no periodicity.
    pub default_bpm: f64,
    /// Peak amplitude at or below which input counts as silence.
    pub silence_threshold: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            min_bpm: 40.0,
            max_bpm: 240.0,
            default_bpm: 120.0,
            silence_threshold: 1e-4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Segmentation {
    /// One segment per detected beat.
    Beats,
    /// Fixed windows spanning `beats_per_window` beats at the detected tempo.
    Window { beats_per_window: f64 },
}

impl Default for Segmentation {
    fn default() -> Self {
        Segmentation::Beats
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PitchStrategy {
    /// Magnitude-weighted mean frequency of the segment spectrum.
    Centroid,
    /// Frame-wise YIN tracking, median of voiced frames.
    Tracker,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PitchConfig {
    pub strategy: PitchStrategy,
    /// Spectral bins below `magnitude_floor * peak` are ignored by the centroid.
    pub magnitude_floor: f32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub threshold: f32,
    pub min_hz: f32,
    pub max_hz: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            strategy: PitchStrategy::Centroid,
            magnitude_floor: 0.05,
            frame_size: 2048,
            hop_size: 512,
            threshold: 0.15,
            min_hz: 50.0,
            max_hz: 2000.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MidiConfig {
    pub velocity: u8,
    pub ticks_per_beat: u16,
    pub channel: u8,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            velocity: 100,
            ticks_per_beat: 480,
            channel: 0,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = if yaml.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn allows(&self, format: AudioFormat) -> bool {
        self.allowed_extensions.contains(&format)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::validation(
                "at least one audio format must be allowed",
            ));
        }

        let beat = &self.beat;
        if beat.hop_size == 0 || beat.frame_size < beat.hop_size {
            return Err(ConfigError::validation(
                "beat frame size must be at least the hop size, which must be positive",
            ));
        }
        if !(beat.min_bpm > 0.0 && beat.min_bpm < beat.max_bpm) {
            return Err(ConfigError::validation(
                "beat tempo range must satisfy 0 < min_bpm < max_bpm",
            ));
        }
        if !(beat.min_bpm..=beat.max_bpm).contains(&beat.default_bpm) {
            return Err(ConfigError::validation(
                "default bpm must lie inside the tempo range",
            ));
        }
        if !(beat.silence_threshold >= 0.0) {
            return Err(ConfigError::validation(
                "silence threshold cannot be negative",
            ));
        }

        if let Segmentation::Window { beats_per_window } = self.segmentation {
            if !beats_per_window.is_finite() || beats_per_window <= 0.0 {
                return Err(ConfigError::validation(
                    "beats per window must be a positive number",
                ));
            }
        }

        let pitch = &self.pitch;
        if !(0.0..1.0).contains(&pitch.magnitude_floor) {
            return Err(ConfigError::validation(
                "magnitude floor must be in [0, 1)",
            ));
        }
        if pitch.hop_size == 0 || pitch.frame_size < pitch.hop_size {
            return Err(ConfigError::validation(
                "pitch frame size must be at least the hop size, which must be positive",
            ));
        }
        if !(pitch.threshold > 0.0 && pitch.threshold < 1.0) {
            return Err(ConfigError::validation(
                "pitch threshold must be in (0, 1)",
            ));
        }
        if !(pitch.min_hz > 0.0 && pitch.min_hz < pitch.max_hz) {
            return Err(ConfigError::validation(
                "pitch range must satisfy 0 < min_hz < max_hz",
            ));
        }

        self.midi.validate()
    }
}

impl MidiConfig {
    /// Every value must fit its MIDI field as-is; nothing is masked or clamped later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.velocity == 0 || self.velocity > 127 {
            return Err(ConfigError::validation("velocity must be in 1..=127"));
        }
        if self.ticks_per_beat == 0 || self.ticks_per_beat > 0x7FFF {
            return Err(ConfigError::validation(
                "ticks per beat must be in 1..=32767",
            ));
        }
        if self.channel > 15 {
            return Err(ConfigError::validation("midi channel must be in 0..=15"));
        }
        Ok(())
    }
}
