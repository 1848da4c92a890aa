use std::borrow::Cow;

use serde::Serialize;

use crate::DomainError;

/// Decoded audio: interleaved samples tagged with rate and channel count.
///
/// Fields are private so a buffer cannot change after it has been loaded.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self, DomainError> {
        if sample_rate == 0 {
            return Err(DomainError::validation("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(DomainError::validation("channel count must be positive"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(DomainError::validation(format!(
                "{} samples cannot be split into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self, DomainError> {
        Self::new(sample_rate, 1, samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Mono view of the buffer, averaging channels when there is more than one.
    pub fn mono_samples(&self) -> Cow<'_, [f32]> {
        downmix(&self.samples, self.channels)
    }

    pub fn into_mono(self) -> Self {
        if self.channels == 1 {
            return self;
        }
        let samples = downmix(&self.samples, self.channels).into_owned();
        Self {
            sample_rate: self.sample_rate,
            channels: 1,
            samples,
        }
    }
}

fn downmix(samples: &[f32], channels: u16) -> Cow<'_, [f32]> {
    if channels <= 1 {
        return Cow::Borrowed(samples);
    }
    let channels = channels as usize;
    Cow::Owned(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect(),
    )
}

/// A contiguous run of frames cut from a [`SampleBuffer`].
#[derive(Clone, Debug, PartialEq)]
pub struct Segment<'a> {
    pub index: usize,
    pub start_frame: usize,
    pub samples: &'a [f32],
    pub channels: u16,
    pub sample_rate: u32,
    /// Seconds from the start of the buffer.
    pub start_time: f64,
    pub duration: f64,
    /// Timestamp the note estimated for this segment is pinned to.
    pub anchor: f64,
}

impl<'a> Segment<'a> {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn mono(&self) -> Cow<'a, [f32]> {
        downmix(self.samples, self.channels)
    }
}
