use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use melody_domain::ConversionError;
use melody_transcriber::ConversionPipeline;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("conversion did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("conversion worker failed: {0}")]
    Worker(String),
}

/// An uploaded recording plus the details of the person who sent it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    pub email: String,
    pub title: String,
    /// File extension of the upload, with or without a leading dot.
    pub extension: String,
    #[serde(skip)]
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MidiArtifact {
    pub title: String,
    pub name: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub tempo_bpm: f64,
    pub note_count: usize,
    #[serde(skip)]
    pub midi_data: Vec<u8>,
}

/// Runs conversions off the async executor. Clones share one pipeline.
#[derive(Clone)]
pub struct ConversionService {
    pipeline: Arc<ConversionPipeline>,
    deadline: Option<Duration>,
}

impl ConversionService {
    pub fn new(pipeline: ConversionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub async fn create_midi(&self, request: UploadRequest) -> Result<MidiArtifact, ServiceError> {
        info!(title = %request.title, extension = %request.extension, bytes = request.audio.len(), "conversion requested");
        let pipeline = Arc::clone(&self.pipeline);
        let UploadRequest {
            name,
            email,
            title,
            extension,
            audio,
        } = request;

        let task = tokio::task::spawn_blocking(move || pipeline.try_convert(&audio, &extension));
        let joined = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(%title, ?deadline, "conversion deadline exceeded");
                    return Err(ServiceError::DeadlineExceeded(deadline));
                }
            },
            None => task.await,
        };
        let conversion = joined.map_err(|err| ServiceError::Worker(err.to_string()))??;

        let artifact = MidiArtifact {
            title,
            name,
            email,
            created_at: OffsetDateTime::now_utc(),
            tempo_bpm: conversion.summary.tempo_bpm,
            note_count: conversion.summary.note_count(),
            midi_data: conversion.midi,
        };
        info!(title = %artifact.title, notes = artifact.note_count, "midi created");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    use melody_audio::encode_wav;
    use melody_domain::{PipelineConfig, SampleBuffer, Segment};
    use melody_transcriber::{decode_notes, PitchEstimator};

    fn upload(extension: &str, audio: Vec<u8>) -> UploadRequest {
        UploadRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            title: "Scale".into(),
            extension: extension.into(),
            audio,
        }
    }

    fn pulsed_wav() -> Vec<u8> {
        let sample_rate = 22_050u32;
        let samples = (0..sample_rate as usize * 2)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let amplitude = 0.3 + 0.7 * (-8.0 * (t % 0.5)).exp();
                amplitude * (2.0 * PI * 440.0 * t).sin()
            })
            .collect();
        encode_wav(&SampleBuffer::mono(sample_rate, samples).unwrap()).unwrap()
    }

    struct Stalling;

    impl PitchEstimator for Stalling {
        fn name(&self) -> &'static str {
            "stalling"
        }

        fn estimate(&self, _segment: &Segment<'_>) -> Option<f32> {
            std::thread::sleep(Duration::from_millis(300));
            None
        }
    }

    struct Exploding;

    impl PitchEstimator for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn estimate(&self, _segment: &Segment<'_>) -> Option<f32> {
            panic!("estimator blew up")
        }
    }

    #[tokio::test]
    async fn creates_midi_for_upload() {
        let service = ConversionService::new(ConversionPipeline::default())
            .with_deadline(Duration::from_secs(30));
        let artifact = service.create_midi(upload("wav", pulsed_wav())).await.unwrap();

        assert_eq!(artifact.title, "Scale");
        assert_eq!(artifact.email, "ada@example.com");
        assert!(artifact.note_count >= 1);
        assert!(artifact.tempo_bpm > 0.0);
        let decoded = decode_notes(&artifact.midi_data).unwrap();
        assert!(decoded.note_ons().any(|m| m.note == 69));
    }

    #[tokio::test]
    async fn unsupported_upload_is_a_conversion_error() {
        let service = ConversionService::new(ConversionPipeline::default());
        let result = service.create_midi(upload("flac", vec![0; 16])).await;
        assert!(matches!(
            result,
            Err(ServiceError::Conversion(ConversionError::UnsupportedFormat(_)))
        ));
    }

    #[tokio::test]
    async fn slow_conversion_hits_deadline() {
        let pipeline =
            ConversionPipeline::with_estimator(PipelineConfig::default(), Box::new(Stalling))
                .unwrap();
        let service = ConversionService::new(pipeline).with_deadline(Duration::from_millis(20));
        let result = service.create_midi(upload("wav", pulsed_wav())).await;
        assert!(matches!(result, Err(ServiceError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn worker_panic_is_reported() {
        let pipeline =
            ConversionPipeline::with_estimator(PipelineConfig::default(), Box::new(Exploding))
                .unwrap();
        let service = ConversionService::new(pipeline);
        let result = service.create_midi(upload("wav", pulsed_wav())).await;
        assert!(matches!(result, Err(ServiceError::Worker(_))));
    }
}
