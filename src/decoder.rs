//! PCM16LE mono decoding for synthesis payloads.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::DecodeError;

/// Sample rate of every payload produced by the synthesis service.
pub const SAMPLE_RATE_HZ: u32 = 24_000;
pub const CHANNEL_COUNT: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

const BYTES_PER_FRAME: usize = (BITS_PER_SAMPLE as usize / 8) * CHANNEL_COUNT as usize;

/// Normalized samples ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
}

impl SampleBuffer {
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channel_count.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate_hz))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode base64 and check the result holds whole 16-bit frames.
pub fn decode_pcm_bytes(base64: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = STANDARD.decode(base64.trim())?;
    if bytes.len() % BYTES_PER_FRAME != 0 {
        return Err(DecodeError::UnalignedFrame { len: bytes.len() });
    }
    Ok(bytes)
}

/// Decode a base64 PCM16LE mono payload into floating point samples in [-1.0, 1.0].
pub fn decode(base64: &str) -> Result<SampleBuffer, DecodeError> {
    let bytes = decode_pcm_bytes(base64)?;
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(SampleBuffer {
        samples,
        sample_rate_hz: SAMPLE_RATE_HZ,
        channel_count: CHANNEL_COUNT,
    })
}
