//! Batch payload decoding and in-memory WAV encoding.
//!
//! Batch requests carry either a WAV container or headerless 16-bit LE PCM.
//! Both come out as 16kHz mono windows; nothing touches the filesystem.

use crate::audio::window::AudioWindow;
use crate::defaults::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::error::{LivescribeError, Result};
use std::io::Cursor;

/// Container formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Wav,
    RawPcm,
    Unsupported(&'static str),
}

/// Guesses the container from magic bytes.
pub fn sniff(bytes: &[u8]) -> Container {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Container::Wav;
    }
    if bytes.starts_with(b"OggS") {
        return Container::Unsupported("ogg");
    }
    if bytes.starts_with(b"fLaC") {
        return Container::Unsupported("flac");
    }
    if bytes.starts_with(b"ID3") {
        return Container::Unsupported("mp3");
    }
    if bytes.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
        return Container::Unsupported("webm");
    }
    Container::RawPcm
}

/// Decodes a batch payload into a 16kHz mono window.
pub fn decode_payload(bytes: &[u8]) -> Result<AudioWindow> {
    if bytes.is_empty() {
        return Err(LivescribeError::Decode {
            message: "audio payload is empty".to_string(),
        });
    }
    match sniff(bytes) {
        Container::Wav => decode_wav(bytes),
        Container::RawPcm => {
            if bytes.len() % BYTES_PER_SAMPLE != 0 {
                return Err(LivescribeError::Decode {
                    message: format!(
                        "raw PCM payload has odd length {}; expected 16-bit samples",
                        bytes.len()
                    ),
                });
            }
            Ok(AudioWindow::from_pcm16le(bytes))
        }
        Container::Unsupported(kind) => Err(LivescribeError::Decode {
            message: format!("unsupported container: {kind}; send WAV or 16-bit PCM"),
        }),
    }
}

/// Parses a WAV container, downmixing to mono and resampling to 16kHz.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioWindow> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| LivescribeError::Decode {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let raw: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LivescribeError::Decode {
                message: format!("Failed to read WAV samples: {}", e),
            })?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LivescribeError::Decode {
                message: format!("Failed to read WAV samples: {}", e),
            })?,
        (format, bits) => {
            return Err(LivescribeError::Decode {
                message: format!("unsupported WAV sample format: {bits}-bit {format:?}"),
            });
        }
    };

    let mono = downmix(&raw, channels);
    let samples = resample(&mono, spec.sample_rate, SAMPLE_RATE);
    Ok(AudioWindow::from_i16(&samples, SAMPLE_RATE))
}

/// Encodes a window as a 16-bit mono WAV file in memory.
pub fn encode_wav(window: &AudioWindow) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: window.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| LivescribeError::Other(
        format!("Failed to start WAV encoding: {}", e),
    ))?;
    for sample in window.to_i16() {
        writer
            .write_sample(sample)
            .map_err(|e| LivescribeError::Other(format!("Failed to encode WAV sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| LivescribeError::Other(format!("Failed to finish WAV encoding: {}", e)))?;
    Ok(cursor.into_inner())
}

fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
