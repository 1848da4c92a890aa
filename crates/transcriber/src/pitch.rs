use std::fmt;
use std::sync::{Arc, Mutex};

use realfft::{RealFftPlanner, RealToComplex};

use melody_audio::dsp::{frame_count, mean_square};
use melody_audio::hann_window;
use melody_domain::{PitchConfig, PitchStrategy, Segment};

/// Estimates the dominant frequency of one segment. `None` means no pitch.
pub trait PitchEstimator: Send + Sync {
    fn name(&self) -> &'static str;
    fn estimate(&self, segment: &Segment<'_>) -> Option<f32>;
}

pub fn estimator_for(config: &PitchConfig) -> Box<dyn PitchEstimator> {
    match config.strategy {
        PitchStrategy::Centroid => Box::new(SpectralCentroid::new(config.magnitude_floor)),
        PitchStrategy::Tracker => Box::new(FrameTracker::from_config(config)),
    }
}

/// Amplitude-weighted mean frequency of the Hann-windowed magnitude spectrum.
///
/// Bins below `magnitude_floor * peak` are left out of the mean. With a floor
/// of zero this is the plain weighted mean over every bin; the configured
/// default of 0.05 drops low-level leakage and noise, which otherwise pull the
/// estimate well above a pure tone's frequency.
///
/// FFT plans are cached by segment length and shared between calls.
#[derive(Clone)]
pub struct SpectralCentroid {
    magnitude_floor: f32,
    planner: Arc<Mutex<RealFftPlanner<f32>>>,
}

impl SpectralCentroid {
    pub fn new(magnitude_floor: f32) -> Self {
        Self {
            magnitude_floor: magnitude_floor.clamp(0.0, 1.0),
            planner: Arc::new(Mutex::new(RealFftPlanner::new())),
        }
    }

    fn plan(&self, len: usize) -> Arc<dyn RealToComplex<f32>> {
        let mut planner = self
            .planner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        planner.plan_fft_forward(len)
    }
}

impl fmt::Debug for SpectralCentroid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralCentroid")
            .field("magnitude_floor", &self.magnitude_floor)
            .finish()
    }
}

impl Default for SpectralCentroid {
    fn default() -> Self {
        Self::new(PitchConfig::default().magnitude_floor)
    }
}

impl PitchEstimator for SpectralCentroid {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn estimate(&self, segment: &Segment<'_>) -> Option<f32> {
        let mono = segment.mono();
        if mono.len() < 2 || mono.iter().all(|s| *s == 0.0) {
            return None;
        }
        let len = mono.len();
        let window = hann_window(len);
        let mut input: Vec<f32> = mono.iter().zip(&window).map(|(s, w)| s * w).collect();

        let fft = self.plan(len);
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum).ok()?;

        let magnitudes: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
        let peak = magnitudes.iter().cloned().fold(0.0f32, f32::max);
        if peak <= 0.0 || !peak.is_finite() {
            return None;
        }
        let floor = peak * self.magnitude_floor;
        let bin_hz = segment.sample_rate as f32 / len as f32;
        let (weighted, total) = magnitudes
            .iter()
            .enumerate()
            .filter(|(_, m)| **m >= floor)
            .fold((0.0f64, 0.0f64), |(weighted, total), (bin, m)| {
                let m = *m as f64;
                (weighted + bin as f64 * bin_hz as f64 * m, total + m)
            });
        if total <= 0.0 {
            return None;
        }
        let centroid = (weighted / total) as f32;
        (centroid.is_finite() && centroid >= 0.0).then_some(centroid)
    }
}

/// YIN pitch tracking over frames of the segment; reports the median of
/// the voiced frames.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    frame_size: usize,
    hop_size: usize,
    threshold: f32,
    min_hz: f32,
    max_hz: f32,
}

impl FrameTracker {
    pub fn from_config(config: &PitchConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            threshold: config.threshold,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
        }
    }

    fn frame_pitch(&self, frame: &[f32], sample_rate: f32) -> Option<f32> {
        if mean_square(frame) < 1e-8 {
            return None;
        }
        let min_lag = ((sample_rate / self.max_hz).ceil() as usize).max(2);
        let max_lag = ((sample_rate / self.min_hz).floor() as usize).min(frame.len() / 2);
        if min_lag >= max_lag {
            return None;
        }
        let width = frame.len() - max_lag;

        let mut diff = vec![0.0f32; max_lag + 1];
        for tau in 1..=max_lag {
            diff[tau] = (0..width)
                .map(|j| {
                    let d = frame[j] - frame[j + tau];
                    d * d
                })
                .sum();
        }

        let mut cmnd = vec![1.0f32; max_lag + 1];
        let mut running = 0.0f32;
        for tau in 1..=max_lag {
            running += diff[tau];
            if running > 0.0 {
                cmnd[tau] = diff[tau] * tau as f32 / running;
            }
        }

        let mut best = None;
        for tau in min_lag..=max_lag {
            if cmnd[tau] < self.threshold {
                let mut t = tau;
                while t < max_lag && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                best = Some(t);
                break;
            }
        }
        let tau = best?;

        let refined = if tau > min_lag && tau < max_lag {
            let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
            let denom = a - 2.0 * b + c;
            if denom.abs() > 1e-12 {
                tau as f32 + (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };
        Some(sample_rate / refined)
    }
}

impl Default for FrameTracker {
    fn default() -> Self {
        Self::from_config(&PitchConfig::default())
    }
}

impl PitchEstimator for FrameTracker {
    fn name(&self) -> &'static str {
        "tracker"
    }

    fn estimate(&self, segment: &Segment<'_>) -> Option<f32> {
        let mono = segment.mono();
        let sample_rate = segment.sample_rate as f32;
        let mut pitches: Vec<f32> = if mono.len() < self.frame_size {
            self.frame_pitch(&mono, sample_rate).into_iter().collect()
        } else {
            (0..frame_count(mono.len(), self.frame_size, self.hop_size))
                .filter_map(|i| {
                    let start = i * self.hop_size;
                    self.frame_pitch(&mono[start..start + self.frame_size], sample_rate)
                })
                .collect()
        };
        if pitches.is_empty() {
            return None;
        }
        pitches.sort_by(|a, b| a.total_cmp(b));
        Some(pitches[pitches.len() / 2])
    }
}
