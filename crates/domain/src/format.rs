use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConversionError;

/// Upload formats the converter accepts.
///
/// FLAC decodes fine but is deliberately not part of the list.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Webm,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::M4a,
        AudioFormat::Wav,
        AudioFormat::Webm,
    ];

    /// Parses a declared extension, ignoring case and a leading dot.
    pub fn from_extension(extension: &str) -> Result<Self, ConversionError> {
        let normalized = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4a" => Ok(AudioFormat::M4a),
            "wav" => Ok(AudioFormat::Wav),
            "webm" => Ok(AudioFormat::Webm),
            _ => Err(ConversionError::UnsupportedFormat(extension.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
        }
    }

    /// The waveform format every other format is converted into.
    pub fn is_canonical(self) -> bool {
        self == AudioFormat::Wav
    }
}

impl FromStr for AudioFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_extensions() {
        for format in AudioFormat::ALL {
            assert_eq!(AudioFormat::from_extension(format.extension()).unwrap(), format);
        }
        assert_eq!(AudioFormat::from_extension(".MP3").unwrap(), AudioFormat::Mp3);
        assert!(AudioFormat::Wav.is_canonical());
        assert!(!AudioFormat::Webm.is_canonical());
    }

    #[test]
    fn rejects_flac_and_unknown() {
        assert!(matches!(
            AudioFormat::from_extension("flac"),
            Err(ConversionError::UnsupportedFormat(_))
        ));
        assert!(AudioFormat::from_extension("").is_err());
        assert!("ogg".parse::<AudioFormat>().is_err());
    }
}
