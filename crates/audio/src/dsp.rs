use std::f32::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakLevel {
    pub max: f32,
    pub min: f32,
}

impl PeakLevel {
    pub fn silence() -> Self {
        Self { max: 0.0, min: 0.0 }
    }

    pub fn magnitude(&self) -> f32 {
        self.max.abs().max(self.min.abs())
    }
}

pub fn peak_level(buffer: &[f32]) -> PeakLevel {
    let mut peak = PeakLevel::silence();
    for sample in buffer.iter() {
        peak.max = peak.max.max(*sample);
        peak.min = peak.min.min(*sample);
    }
    peak
}

/// Scales `buffer` so its largest magnitude is 1.0 and returns the level before scaling.
pub fn normalize_buffer(buffer: &mut [f32]) -> PeakLevel {
    let peak = peak_level(buffer);
    let gain = peak.magnitude().max(1e-6);
    for sample in buffer.iter_mut() {
        *sample /= gain;
    }
    peak
}

/// Periodic Hann window of `len` points.
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / len as f32).cos()))
        .collect()
}

pub fn mean_square(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32
}

/// Number of full frames of `frame_size` taken every `hop_size` samples.
pub fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if len < frame_size || hop_size == 0 {
        0
    } else {
        (len - frame_size) / hop_size + 1
    }
}
