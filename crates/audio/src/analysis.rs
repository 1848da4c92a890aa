use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::dsp::{frame_count, mean_square};

/// Half-wave rectified log-energy flux, one value per analysis frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnsetEnvelope {
    pub strength: Array1<f32>,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
}

impl OnsetEnvelope {
    pub fn compute(samples: &[f32], sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        let frames = frame_count(samples.len(), frame_size, hop_size);
        let mut strength = Array1::<f32>::zeros(frames);
        let mut previous = 0.0f32;
        for (i, value) in strength.iter_mut().enumerate() {
            let start = i * hop_size;
            let energy = (1.0 + 1000.0 * mean_square(&samples[start..start + frame_size])).ln();
            *value = (energy - previous).max(0.0);
            previous = energy;
        }
        Self {
            strength,
            sample_rate,
            frame_size,
            hop_size,
        }
    }

    pub fn len(&self) -> usize {
        self.strength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strength.is_empty()
    }

    /// Seconds per envelope frame.
    pub fn frame_period(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Centre of frame `index` in seconds; always positive.
    pub fn frame_time(&self, index: usize) -> f64 {
        (index * self.hop_size) as f64 / self.sample_rate as f64
            + self.frame_size as f64 / (2.0 * self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_peaks_at_bursts() {
        let sample_rate = 8_000;
        let mut samples = vec![0.0f32; 8_000];
        for sample in samples[4_000..4_400].iter_mut() {
            *sample = 0.8;
        }
        let envelope = OnsetEnvelope::compute(&samples, sample_rate, 256, 128);
        assert_eq!(envelope.len(), (8_000 - 256) / 128 + 1);
        let (peak_index, _) = envelope
            .strength
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
        let peak_time = envelope.frame_time(peak_index);
        assert!((peak_time - 0.5).abs() < 0.05, "peak at {peak_time}");
    }

    #[test]
    fn silence_has_no_strength() {
        let envelope = OnsetEnvelope::compute(&[0.0; 4_096], 8_000, 512, 256);
        assert!(envelope.strength.iter().all(|v| *v == 0.0));
        assert!(envelope.frame_time(0) > 0.0);
        assert!(OnsetEnvelope::compute(&[0.0; 100], 8_000, 512, 256).is_empty());
    }
}
