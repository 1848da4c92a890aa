use std::borrow::Cow;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use melody_domain::{AudioFormat, ConversionError, ConversionResult, PipelineConfig, SampleBuffer};

/// Turns uploaded audio bytes into samples, honouring an extension allow-list.
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    allowed: Vec<AudioFormat>,
}

impl AudioDecoder {
    pub fn new(allowed: impl Into<Vec<AudioFormat>>) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.allowed_extensions.clone())
    }

    pub fn allowed(&self) -> &[AudioFormat] {
        &self.allowed
    }

    /// Resolves `extension` against the allow-list without touching any data.
    pub fn check_format(&self, extension: &str) -> ConversionResult<AudioFormat> {
        let format = AudioFormat::from_extension(extension)?;
        if !self.allowed.contains(&format) {
            return Err(ConversionError::UnsupportedFormat(format!(
                "{format} is not enabled"
            )));
        }
        Ok(format)
    }

    /// Returns a WAV byte stream for the upload. WAV input is passed through untouched.
    pub fn to_wav<'a>(&self, bytes: &'a [u8], extension: &str) -> ConversionResult<Cow<'a, [u8]>> {
        let format = self.check_format(extension)?;
        if format.is_canonical() {
            return Ok(Cow::Borrowed(bytes));
        }
        let buffer = decode_bytes(bytes, format)?;
        encode_wav(&buffer).map(Cow::Owned)
    }

    /// Canonicalises the upload to WAV, then reads samples from the WAV stream.
    pub fn load(&self, bytes: &[u8], extension: &str) -> ConversionResult<SampleBuffer> {
        let wav = self.to_wav(bytes, extension)?;
        decode_bytes(&wav, AudioFormat::Wav)
    }

    pub fn decode(&self, bytes: &[u8], extension: &str) -> ConversionResult<SampleBuffer> {
        let format = self.check_format(extension)?;
        decode_bytes(bytes, format)
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> ConversionResult<SampleBuffer> {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let format = self.check_format(extension)?;
        let bytes = fs::read(path_ref).map_err(|err| {
            ConversionError::failure(format!("open audio file {:?}: {err}", path_ref))
        })?;
        decode_bytes(&bytes, format)
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new(AudioFormat::ALL.to_vec())
    }
}

fn decode_bytes(bytes: &[u8], format: AudioFormat) -> ConversionResult<SampleBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| ConversionError::decode(format!("probe {format} stream: {err}")))?;
    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| ConversionError::decode("no default track found"))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| ConversionError::decode(format!("unsupported codec: {err}")))?;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(err) => return Err(ConversionError::decode(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphError::DecodeError(msg)) => {
                skipped += 1;
                warn!(reason = msg, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(ConversionError::decode(err.to_string())),
        };
        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);
        let mut out = InterleavedBuffer::<f32>::new(decoded.capacity() as u64, spec);
        out.copy_interleaved_ref(decoded);
        samples.extend_from_slice(out.samples());
    }

    if samples.is_empty() {
        return Err(ConversionError::decode(format!(
            "{format} stream produced no samples ({skipped} packets skipped)"
        )));
    }
    let sample_rate =
        sample_rate.ok_or_else(|| ConversionError::decode("stream has no sample rate"))?;
    let channels = channels.unwrap_or(1);
    debug!(
        sample_rate,
        channels,
        sample_count = samples.len(),
        skipped,
        "decoded audio"
    );
    SampleBuffer::new(sample_rate, channels, samples)
        .map_err(|err| ConversionError::decode(err.to_string()))
}

/// Encodes a buffer as 32-bit float WAV, keeping samples bit-exact.
pub fn encode_wav(buffer: &SampleBuffer) -> ConversionResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let wav_err = |err: hound::Error| ConversionError::failure(format!("wav encode: {err}"));
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
        for sample in buffer.samples() {
            writer.write_sample(*sample).map_err(wav_err)?;
        }
        writer.finalize().map_err(wav_err)?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wav(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
        let frames = (sample_rate as f32 * seconds) as usize;
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
            for _ in 0..channels {
                samples.push(value);
            }
        }
        let buffer = SampleBuffer::new(sample_rate, channels, samples).unwrap();
        encode_wav(&buffer).unwrap()
    }

    #[test]
    fn audio_decoder_handles_missing_file() {
        let result = AudioDecoder::default().open("does-not-exist.wav");
        assert!(matches!(result, Err(ConversionError::ConversionFailure(_))));
    }

    #[test]
    fn every_supported_extension_passes_the_allow_list() {
        let decoder = AudioDecoder::default();
        for ext in ["mp3", "m4a", "wav", "webm", "WAV"] {
            assert!(decoder.check_format(ext).is_ok(), "{ext} rejected");
        }
    }

    #[test]
    fn flac_is_rejected_before_decoding() {
        let decoder = AudioDecoder::default();
        let result = decoder.decode(b"fLaC not really", "flac");
        assert!(matches!(result, Err(ConversionError::UnsupportedFormat(_))));
        assert!(matches!(
            decoder.to_wav(b"", "flac"),
            Err(ConversionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn disabled_format_is_unsupported() {
        let decoder = AudioDecoder::new(vec![AudioFormat::Wav]);
        assert!(matches!(
            decoder.check_format("mp3"),
            Err(ConversionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn wav_is_returned_unchanged() {
        let bytes = b"RIFF-anything";
        let output = AudioDecoder::default().to_wav(bytes, "wav").unwrap();
        assert!(matches!(output, Cow::Borrowed(_)));
        assert_eq!(output.as_ref(), bytes);
    }

    #[test]
    fn decodes_wav_payload() {
        let bytes = sine_wav(22_050, 2, 0.5);
        let buffer = AudioDecoder::default().decode(&bytes, "wav").unwrap();
        assert_eq!(buffer.sample_rate(), 22_050);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 11_025);
        assert!(buffer.peak() > 0.45 && buffer.peak() <= 0.51);
    }

    #[test]
    fn load_reads_through_the_wav_fast_path() {
        let bytes = sine_wav(16_000, 1, 0.25);
        let decoder = AudioDecoder::default();
        let buffer = decoder.load(&bytes, ".Wav").unwrap();
        assert_eq!(buffer.frames(), 4_000);
        assert!(!buffer.is_empty());
        assert!(matches!(
            decoder.load(&bytes, "flac"),
            Err(ConversionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn corrupt_data_is_a_decode_error() {
        let decoder = AudioDecoder::default();
        for ext in ["mp3", "m4a", "webm", "wav"] {
            let result = decoder.decode(&[0u8; 64], ext);
            assert!(
                matches!(result, Err(ConversionError::DecodeError(_))),
                "{ext}: {result:?}"
            );
        }
    }
}
