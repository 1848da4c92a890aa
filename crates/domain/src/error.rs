use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure of one stage of an audio to MIDI conversion.
///
/// Every stage reports its own variant; the pipeline entry point collapses
/// all of them into a single "no result" signal for its caller.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode audio: {0}")]
    DecodeError(String),
    #[error("no beats detected: {0}")]
    NoBeatsDetected(String),
    #[error("invalid segment count: {0}")]
    InvalidSegmentCount(String),
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
    #[error("conversion failed: {0}")]
    ConversionFailure(String),
}

impl ConversionError {
    pub fn decode<T: Into<String>>(message: T) -> Self {
        Self::DecodeError(message.into())
    }

    pub fn no_beats<T: Into<String>>(message: T) -> Self {
        Self::NoBeatsDetected(message.into())
    }

    pub fn timing<T: Into<String>>(message: T) -> Self {
        Self::InvalidTiming(message.into())
    }

    pub fn failure<T: Into<String>>(message: T) -> Self {
        Self::ConversionFailure(message.into())
    }
}

impl From<DomainError> for ConversionError {
    fn from(err: DomainError) -> Self {
        Self::ConversionFailure(err.to_string())
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
