use tracing::debug;

use melody_domain::{BeatTrack, ConversionError, ConversionResult, SampleBuffer, Segment};

/// Cuts a buffer into contiguous segments that together cover every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct Segmenter;

impl Segmenter {
    /// `count` slices of `frames / count` frames; the remainder joins the last slice.
    /// Each segment is anchored at its centre.
    pub fn by_count<'a>(
        &self,
        buffer: &'a SampleBuffer,
        count: usize,
    ) -> ConversionResult<Vec<Segment<'a>>> {
        if count == 0 {
            return Err(ConversionError::InvalidSegmentCount(
                "segment count must be positive".into(),
            ));
        }
        let frames = buffer.frames();
        let length = frames / count;
        let segments: Vec<Segment<'a>> = (0..count)
            .map(|index| {
                let start = index * length;
                let end = if index + 1 == count { frames } else { start + length };
                slice(buffer, index, start, end)
            })
            .collect();
        debug!(count, frames, length, "segmented by count");
        Ok(segments)
    }

    /// One segment per beat, each pinned to its beat timestamp.
    pub fn by_beats<'a>(
        &self,
        buffer: &'a SampleBuffer,
        track: &BeatTrack,
    ) -> ConversionResult<Vec<Segment<'a>>> {
        let mut segments = self.by_count(buffer, track.len())?;
        for (segment, beat) in segments.iter_mut().zip(track.beats()) {
            segment.anchor = *beat;
        }
        Ok(segments)
    }

    /// Fixed windows of `beats_per_window` beats at `tempo`; a trailing
    /// partial window is kept as its own segment.
    pub fn by_tempo_window<'a>(
        &self,
        buffer: &'a SampleBuffer,
        tempo: f64,
        beats_per_window: f64,
    ) -> ConversionResult<Vec<Segment<'a>>> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(ConversionError::InvalidSegmentCount(format!(
                "tempo {tempo} cannot size a window"
            )));
        }
        if !beats_per_window.is_finite() || beats_per_window <= 0.0 {
            return Err(ConversionError::InvalidSegmentCount(format!(
                "{beats_per_window} beats per window"
            )));
        }
        let window = (buffer.sample_rate() as f64 * 60.0 / tempo * beats_per_window).round();
        if window < 1.0 {
            return Err(ConversionError::InvalidSegmentCount(
                "window is shorter than one frame".into(),
            ));
        }
        let window = window as usize;
        let frames = buffer.frames();
        let count = frames.div_ceil(window).max(1);
        let segments: Vec<Segment<'a>> = (0..count)
            .map(|index| {
                let start = (index * window).min(frames);
                let end = (start + window).min(frames);
                slice(buffer, index, start, end)
            })
            .collect();
        debug!(count, frames, window, "segmented by tempo window");
        Ok(segments)
    }
}

fn slice(buffer: &SampleBuffer, index: usize, start: usize, end: usize) -> Segment<'_> {
    let channels = buffer.channels();
    let rate = buffer.sample_rate() as f64;
    let start_time = start as f64 / rate;
    let duration = (end - start) as f64 / rate;
    Segment {
        index,
        start_frame: start,
        samples: &buffer.samples()[start * channels as usize..end * channels as usize],
        channels,
        sample_rate: buffer.sample_rate(),
        start_time,
        duration,
        anchor: start_time + duration / 2.0,
    }
}
