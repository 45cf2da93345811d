//! Per-session accumulator for streamed PCM frames.
//!
//! Clients send 16-bit little-endian mono PCM in arbitrary chunk sizes. The
//! buffer stores raw bytes, so the windows it produces depend only on the
//! concatenated byte stream and never on how the client split it.

use crate::audio::window::{AudioWindow, bytes_for_secs, secs_for_bytes};
use crate::defaults::{BUFFER_SECS, BYTES_PER_SAMPLE, OVERLAP_SECS};

/// What happens to buffered audio after a window has been processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlapPolicy {
    /// Keep this many trailing seconds as context for the next window.
    Retain(f32),
    /// Drop everything.
    Discard,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Retain(OVERLAP_SECS)
    }
}

/// Growable byte buffer of client audio with window extraction.
#[derive(Debug)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    threshold_bytes: usize,
    policy: OverlapPolicy,
}

impl FrameBuffer {
    /// Creates a buffer that becomes ready after `buffer_secs` of audio.
    pub fn new(buffer_secs: f32, policy: OverlapPolicy) -> Self {
        Self {
            bytes: Vec::new(),
            threshold_bytes: bytes_for_secs(buffer_secs).max(BYTES_PER_SAMPLE),
            policy,
        }
    }

    /// Appends a client frame. Empty frames are a no-op.
    pub fn append(&mut self, frame: &[u8]) {
        self.bytes.extend_from_slice(frame);
    }

    /// Buffered duration in seconds (whole samples only).
    pub fn duration_secs(&self) -> f32 {
        secs_for_bytes(self.bytes.len())
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether enough audio has accumulated to cut a window.
    pub fn should_process(&self) -> bool {
        self.bytes.len() >= self.threshold_bytes
    }

    /// Decodes the whole buffer into a window without consuming it.
    ///
    /// A trailing odd byte stays in the buffer and is not part of the window.
    pub fn take_window(&self) -> AudioWindow {
        AudioWindow::from_pcm16le(&self.bytes)
    }

    /// Keeps only the trailing `secs` of audio, aligned to whole samples.
    ///
    /// If the buffer holds no more than that, it is emptied instead.
    pub fn retain_overlap(&mut self, secs: f32) {
        let keep = bytes_for_secs(secs);
        let whole = self.bytes.len() - self.bytes.len() % BYTES_PER_SAMPLE;
        if keep == 0 || whole <= keep {
            self.clear();
            return;
        }
        let start = whole - keep;
        self.bytes.drain(..start);
    }

    /// Applies the configured overlap policy after a window was processed.
    pub fn advance(&mut self) {
        match self.policy {
            OverlapPolicy::Retain(secs) => self.retain_overlap(secs),
            OverlapPolicy::Discard => self.clear(),
        }
    }

    /// Drops all buffered audio.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bytes.shrink_to_fit();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(BUFFER_SECS, OverlapPolicy::default())
    }
}
