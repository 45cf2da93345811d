//! Decoded audio windows handed to the inference engines.

use crate::defaults::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use std::sync::Arc;
use std::time::Duration;

/// Immutable snapshot of decoded audio.
///
/// Samples are normalized to `[-1.0, 1.0)` and shared behind an `Arc`, so a
/// window can be handed to several engines without copying. The last clone
/// dropped frees the samples; nothing else ever holds on to them.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioWindow {
    /// Creates a window from already normalized samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Decodes 16-bit little-endian PCM bytes into a window at the engine rate.
    ///
    /// A trailing odd byte is ignored; it belongs to a sample that has not
    /// fully arrived yet.
    pub fn from_pcm16le(bytes: &[u8]) -> Self {
        Self::new(pcm16le_to_f32(bytes), SAMPLE_RATE)
    }

    /// Creates a window from 16-bit samples.
    pub fn from_i16(samples: &[i16], sample_rate: u32) -> Self {
        Self::new(samples.iter().map(|&s| s as f32 / 32768.0).collect(), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the window in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.duration_secs())
    }

    /// Root-mean-square energy of the window.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Whether the window is long and loud enough to be worth an engine call.
    pub fn is_submittable(&self, min_secs: f32, min_energy: f32) -> bool {
        self.duration_secs() >= min_secs && self.rms() >= min_energy
    }

    /// Converts back to 16-bit samples, clamping to the i16 range.
    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect()
    }
}

/// Converts raw 16-bit little-endian PCM to normalized floats.
///
/// Scales by the full signed 16-bit range (32768) so `i16::MIN` maps to -1.0.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Number of PCM bytes covering `secs` seconds at the engine rate.
///
/// Always a whole number of samples.
pub fn bytes_for_secs(secs: f32) -> usize {
    let samples = (secs.max(0.0) * SAMPLE_RATE as f32).round() as usize;
    samples * BYTES_PER_SAMPLE
}

/// Duration in seconds covered by `len` PCM bytes at the engine rate.
pub fn secs_for_bytes(len: usize) -> f32 {
    (len / BYTES_PER_SAMPLE) as f32 / SAMPLE_RATE as f32
}
