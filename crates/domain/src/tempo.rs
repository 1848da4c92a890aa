use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Global tempo plus the beat timestamps it was derived from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BeatTrack {
    /// Beats per minute.
    tempo: f64,
    /// Seconds from the start of the recording, strictly increasing.
    beats: Vec<f64>,
}

impl BeatTrack {
    pub fn new(tempo: f64, beats: Vec<f64>) -> Result<Self, DomainError> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(DomainError::validation("tempo must be a positive number"));
        }
        if beats.is_empty() {
            return Err(DomainError::validation(
                "beat track requires at least one beat",
            ));
        }
        if beats.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(DomainError::validation(
                "beat timestamps must be finite and non-negative",
            ));
        }
        if beats.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(DomainError::validation(
                "beat timestamps must be strictly increasing",
            ));
        }
        Ok(Self { tempo, beats })
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }
}
