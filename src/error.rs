//! Error types for the demonstration audio pipeline.

use thiserror::Error;

/// Malformed synthesis payloads. Deterministic: retrying the same input fails the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("audio payload is {len} bytes, not a whole number of 16-bit samples")]
    UnalignedFrame { len: usize },
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidBase64(err.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio output device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Payloads a RIFF header cannot describe; its size fields are 32-bit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WavError {
    #[error("audio payload of {len} bytes exceeds the WAV size limit")]
    PayloadTooLarge { len: usize },

    #[error("sample rate {0} Hz is too high for a 16-bit WAV header")]
    SampleRateTooHigh(u32),
}

/// Failures reported by (or while talking to) the synthesis service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("synthesis service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("synthesis response contained no audio")]
    MissingAudio,

    #[error("synthesis returned unusable audio: {0}")]
    InvalidAudio(#[from] DecodeError),

    #[error("unexpected synthesis response: {0}")]
    InvalidResponse(String),
}

/// Returned by the single-flight guard when the same work is already outstanding.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("request already in progress")]
pub struct AlreadyInProgress;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Wav(#[from] WavError),

    #[error("unknown voice: {0}")]
    UnknownVoice(String),

    #[error("script is empty")]
    EmptyScript,

    #[error("no demonstration audio has been generated for the current script and voice")]
    NoDemoAudio,

    #[error("failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}
