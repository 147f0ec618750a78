//! Canonical 44-byte WAV container for PCM16 mono payloads, plus the download helpers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::asset::AudioAsset;
use crate::error::{PipelineError, WavError};

pub const HEADER_LEN: usize = 44;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// Wrap raw PCM16LE mono bytes in a RIFF/WAVE container.
///
/// Fails only when the payload or sample rate overflows the header's 32-bit fields.
pub fn encode(pcm: &[u8], sample_rate_hz: u32) -> Result<Vec<u8>, WavError> {
    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    out.extend_from_slice(&header(pcm.len(), sample_rate_hz)?);
    out.extend_from_slice(pcm);
    Ok(out)
}

fn header(data_len: usize, sample_rate_hz: u32) -> Result<[u8; HEADER_LEN], WavError> {
    let too_large = || WavError::PayloadTooLarge { len: data_len };
    let data_len_field = u32::try_from(data_len).map_err(|_| too_large())?;
    let chunk_size = data_len_field.checked_add(36).ok_or_else(too_large)?;
    let byte_rate = sample_rate_hz
        .checked_mul(u32::from(BLOCK_ALIGN))
        .ok_or(WavError::SampleRateTooHigh(sample_rate_hz))?;

    let mut out = [0u8; HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");

    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    out[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    out[24..28].copy_from_slice(&sample_rate_hz.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    out[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_len_field.to_le_bytes());
    Ok(out)
}

/// `ai_voice_YYYYMMDDHHMMSS.wav`
pub fn download_file_name(timestamp: NaiveDateTime) -> String {
    format!("ai_voice_{}.wav", timestamp.format("%Y%m%d%H%M%S"))
}

/// Encode `asset` and write it into `dir` under the download file name.
pub fn write_download(
    dir: &Path,
    asset: &AudioAsset,
    timestamp: NaiveDateTime,
) -> Result<PathBuf, PipelineError> {
    let bytes = encode(&asset.pcm_bytes()?, asset.sample_rate_hz())?;
    fs::create_dir_all(dir)?;
    let path = dir.join(download_file_name(timestamp));
    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_empty_payload_header() {
        let wav = encode(&[], 24_000).unwrap();
        assert_eq!(wav.len(), 44);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 24_000);
        assert_eq!(u32_at(&wav, 28), 48_000);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 0);
    }

    #[test]
    fn test_header_matches_reference_bytes() {
        let wav = encode(&[0x01, 0x02], 24_000).unwrap();
        let expected: [u8; 46] = [
            b'R', b'I', b'F', b'F', 38, 0, 0, 0, b'W', b'A', b'V', b'E', b'f', b'm', b't', b' ',
            16, 0, 0, 0, 1, 0, 1, 0, 0xC0, 0x5D, 0, 0, 0x80, 0xBB, 0, 0, 2, 0, 16, 0, b'd', b'a',
            b't', b'a', 2, 0, 0, 0, 0x01, 0x02,
        ];
        assert_eq!(wav, expected);
    }

    #[test]
    fn test_output_is_readable_by_hound() {
        let pcm: Vec<u8> = [0i16, 1000, -1000, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav = encode(&pcm, 24_000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn test_header_rejects_oversized_fields() {
        assert_eq!(
            header(u32::MAX as usize, 24_000),
            Err(WavError::PayloadTooLarge { len: u32::MAX as usize })
        );
        assert_eq!(
            header(0, u32::MAX),
            Err(WavError::SampleRateTooHigh(u32::MAX))
        );

        let largest = u32::MAX as usize - 36;
        let max = header(largest, 24_000).unwrap();
        assert_eq!(u32_at(&max, 4), u32::MAX);
        assert_eq!(u32_at(&max, 40), u32::MAX - 36);
    }

    #[test]
    fn test_download_file_name_pattern() {
        let ts = NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap();
        assert_eq!(download_file_name(ts), "ai_voice_20260307090502.wav");
    }

    #[test]
    fn test_write_download_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let asset = AudioAsset::new(STANDARD.encode([7u8, 0, 9, 0]), "Kore", "h").unwrap();
        let ts = NaiveDate::from_ymd_opt(2025, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();

        let path = write_download(dir.path(), &asset, ts).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "ai_voice_20251231235959.wav"
        );
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 48);
        assert_eq!(&written[44..], &[7, 0, 9, 0]);
    }

    proptest! {
        #[test]
        fn prop_payload_survives_after_header(
            pcm in proptest::collection::vec(any::<u8>(), 0..1024),
            rate in 8_000u32..96_000,
        ) {
            let mut pcm = pcm;
            if pcm.len() % 2 == 1 {
                pcm.pop();
            }
            let wav = encode(&pcm, rate).unwrap();
            prop_assert_eq!(wav.len(), HEADER_LEN + pcm.len());
            prop_assert_eq!(&wav[HEADER_LEN..], &pcm[..]);
            prop_assert_eq!(u32_at(&wav, 4), 36 + pcm.len() as u32);
            prop_assert_eq!(u32_at(&wav, 28), rate * 2);
        }
    }
}
