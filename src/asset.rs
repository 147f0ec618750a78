use sha2::{Digest, Sha256};

use crate::decoder::{self, BITS_PER_SAMPLE, CHANNEL_COUNT, SAMPLE_RATE_HZ};
use crate::error::DecodeError;

/// Synthesized speech for one (voice, script) pair.
///
/// Construction validates that the payload decodes to whole 16-bit frames, so every
/// asset handed out by the cache can be played and exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pcm_base64: String,
    sample_rate_hz: u32,
    channel_count: u16,
    bits_per_sample: u16,
    voice_id: String,
    source_text_hash: String,
}

impl AudioAsset {
    pub fn new(
        pcm_base64: String,
        voice_id: impl Into<String>,
        source_text_hash: impl Into<String>,
    ) -> Result<Self, DecodeError> {
        decoder::decode_pcm_bytes(&pcm_base64)?;
        Ok(Self {
            pcm_base64,
            sample_rate_hz: SAMPLE_RATE_HZ,
            channel_count: CHANNEL_COUNT,
            bits_per_sample: BITS_PER_SAMPLE,
            voice_id: voice_id.into(),
            source_text_hash: source_text_hash.into(),
        })
    }

    pub fn pcm_base64(&self) -> &str {
        &self.pcm_base64
    }

    pub fn pcm_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        decoder::decode_pcm_bytes(&self.pcm_base64)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn source_text_hash(&self) -> &str {
        &self.source_text_hash
    }
}

/// The part of a script that is sent to the synthesis service.
///
/// Truncates on a character boundary, never inside a UTF-8 sequence.
pub fn text_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Hex SHA-256 of the synthesized text, used as the script half of a cache key.
pub fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
