use ndarray::{s, Array1};
use tracing::{debug, instrument, warn};

use melody_audio::{normalize_buffer, OnsetEnvelope};
use melody_domain::{BeatConfig, BeatTrack, ConversionError, ConversionResult, SampleBuffer};

/// Weakest normalized autocorrelation still accepted as a tempo.
const MIN_CORRELATION: f32 = 0.05;

/// Beats are snapped to the strongest onset within this fraction of a period.
const SNAP_FRACTION: f64 = 0.1;

/// Onset-envelope beat tracker: autocorrelation picks the tempo, a phase
/// search lays the beat grid, grid points snap to nearby onsets.
#[derive(Debug, Clone, Default)]
pub struct BeatTracker {
    config: BeatConfig,
}

impl BeatTracker {
    pub fn new(config: BeatConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(sample_rate = buffer.sample_rate(), frames = buffer.frames()))]
    pub fn estimate(&self, buffer: &SampleBuffer) -> ConversionResult<BeatTrack> {
        let sample_rate = buffer.sample_rate();
        let mut mono = buffer.mono_samples().into_owned();
        let peak = normalize_buffer(&mut mono);
        if peak.magnitude() <= self.config.silence_threshold {
            return Err(ConversionError::no_beats("input is silent"));
        }

        let shortest_beat = (60.0 / self.config.max_bpm * sample_rate as f64).ceil() as usize;
        if mono.len() < shortest_beat.max(self.config.frame_size) {
            return Err(ConversionError::no_beats(format!(
                "{} samples is shorter than one beat period",
                mono.len()
            )));
        }

        let envelope = OnsetEnvelope::compute(
            &mono,
            sample_rate,
            self.config.frame_size,
            self.config.hop_size,
        );
        let tempo = match self.periodicity(&envelope) {
            Some(bpm) => bpm,
            None => {
                warn!(
                    default_bpm = self.config.default_bpm,
                    "onset envelope has no periodicity; using default tempo"
                );
                self.config.default_bpm
            }
        };

        let beats = place_beats(&envelope, tempo);
        if beats.is_empty() {
            return Err(ConversionError::no_beats("no onsets matched the tempo grid"));
        }
        debug!(tempo, beat_count = beats.len(), "beat track estimated");
        Ok(BeatTrack::new(tempo, beats)?)
    }

    /// Tempo in BPM from the autocorrelation of the mean-removed envelope.
    fn periodicity(&self, envelope: &OnsetEnvelope) -> Option<f64> {
        let n = envelope.len();
        let frame_period = envelope.frame_period();
        let min_lag = ((60.0 / (self.config.max_bpm * frame_period)).floor() as usize).max(1);
        let max_lag = ((60.0 / (self.config.min_bpm * frame_period)).ceil() as usize).min(n / 2);
        if min_lag >= max_lag {
            return None;
        }

        let mean = envelope.strength.mean()?;
        let centered: Array1<f32> = &envelope.strength - mean;
        let energy = centered.dot(&centered);
        if energy < 1e-10 {
            return None;
        }
        let correlation = |lag: usize| -> f32 {
            centered.slice(s![..n - lag]).dot(&centered.slice(s![lag..])) / energy
        };

        // Log-normal prior around the default tempo keeps the pick off
        // multiples of the beat period.
        let prior = |lag: usize| -> f32 {
            let bpm = 60.0 / (lag as f64 * frame_period);
            let octaves = (bpm / self.config.default_bpm).log2();
            (-0.5 * octaves * octaves).exp() as f32
        };

        let mut best_lag = min_lag;
        let mut best_corr = f32::NEG_INFINITY;
        let mut best_score = f32::NEG_INFINITY;
        for lag in min_lag..=max_lag {
            let corr = correlation(lag);
            let score = corr * prior(lag);
            if score > best_score {
                best_score = score;
                best_corr = corr;
                best_lag = lag;
            }
        }
        if best_corr < MIN_CORRELATION {
            return None;
        }

        let lag = if best_lag > min_lag && best_lag < max_lag {
            let prev = correlation(best_lag - 1);
            let next = correlation(best_lag + 1);
            let denom = prev - 2.0 * best_corr + next;
            if denom.abs() > 1e-10 {
                best_lag as f64 + (0.5 * (prev - next) / denom).clamp(-0.5, 0.5) as f64
            } else {
                best_lag as f64
            }
        } else {
            best_lag as f64
        };
        let bpm = 60.0 / (lag * frame_period);
        debug!(best_lag, best_corr, bpm, "tempo from autocorrelation");
        Some(bpm.clamp(self.config.min_bpm, self.config.max_bpm))
    }
}

/// Walks a grid of the given tempo from the best-scoring phase, snapping each
/// point to the strongest nearby onset. Returns strictly increasing times.
fn place_beats(envelope: &OnsetEnvelope, tempo: f64) -> Vec<f64> {
    let n = envelope.len();
    if n == 0 {
        return Vec::new();
    }
    let strength = &envelope.strength;
    let period = 60.0 / tempo / envelope.frame_period();
    let grid_score = |phase: usize| -> f32 {
        let mut score = 0.0;
        let mut position = phase as f64;
        while (position.round() as usize) < n {
            score += strength[position.round() as usize];
            position += period;
        }
        score
    };

    let phases = (period.ceil() as usize).clamp(1, n);
    let mut best_phase = 0;
    let mut best_score = f32::NEG_INFINITY;
    for phase in 0..phases {
        let score = grid_score(phase);
        if score > best_score {
            best_score = score;
            best_phase = phase;
        }
    }

    let tolerance = ((period * SNAP_FRACTION).round() as usize).max(1);
    let mut frames: Vec<usize> = Vec::new();
    let mut position = best_phase as f64;
    while (position.round() as usize) < n {
        let centre = position.round() as usize;
        let lo = centre.saturating_sub(tolerance);
        let hi = (centre + tolerance).min(n - 1);
        let mut snapped = centre;
        for frame in lo..=hi {
            if strength[frame] > strength[snapped] {
                snapped = frame;
            }
        }
        if frames.last().map_or(true, |&last| snapped > last) {
            frames.push(snapped);
        }
        position += period;
    }
    frames.into_iter().map(|f| envelope.frame_time(f)).collect()
}
