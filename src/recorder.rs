use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("input device error: {0}")]
    Device(String),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to package recording: {0}")]
    Wav(#[from] hound::Error),
}

/// Captures practice takes from the default microphone.
pub struct Recorder;

impl Recorder {
    pub fn new() -> Self {
        Self
    }

    /// Record for `duration` and return the take as a complete 16-bit mono WAV file.
    ///
    /// Blocks the calling thread for the whole duration.
    pub fn record(&self, duration: Duration) -> Result<Vec<u8>, RecordError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(RecordError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|e| RecordError::Device(e.to_string()))?;
        info!("Recorder: input config {:?}", config);

        let channels = config.channels();
        let sample_rate = config.sample_rate();
        let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
        let err_fn = |err: cpal::StreamError| error!("Recorder: stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let buffer = buffer.clone();
                device.build_input_stream(
                    &config.clone().into(),
                    move |data: &[f32], _: &_| {
                        buffer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(data);
                    },
                    err_fn,
                    None,
                )
            }
            cpal::SampleFormat::I16 => {
                let buffer = buffer.clone();
                device.build_input_stream(
                    &config.clone().into(),
                    move |data: &[i16], _: &_| {
                        buffer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend(data.iter().map(|&s| f32::from(s) / 32768.0));
                    },
                    err_fn,
                    None,
                )
            }
            other => return Err(RecordError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(|e| RecordError::Device(e.to_string()))?;

        stream.play().map_err(|e| RecordError::Device(e.to_string()))?;
        info!("Recorder: recording for {:?}", duration);
        thread::sleep(duration);
        drop(stream);

        let captured = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
        info!("Recorder: captured {} samples", captured.len());
        encode_take(&captured, channels, sample_rate)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Downmix interleaved `f32` samples to mono and write a 16-bit WAV file in memory.
pub fn encode_take(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>, RecordError> {
    let channels = usize::from(channels.max(1));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for frame in samples.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            writer.write_sample((mono.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}
