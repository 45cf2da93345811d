//! Speaker diarization behind the [`Diarizer`] trait.
//!
//! An empty turn list is a valid answer meaning "no diarization available";
//! callers fall back to plain transcription.

#[cfg(feature = "remote-engines")]
pub mod remote;

use crate::audio::AudioWindow;
use crate::error::{LivescribeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A time span attributed to one anonymous speaker.
///
/// `speaker` is an engine-local tag with no meaning across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f32,
    pub end: f32,
    pub speaker: String,
}

impl SpeakerTurn {
    pub fn new(start: f32, end: f32, speaker: &str) -> Self {
        Self {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }
}

/// Trait for speaker diarization engines. Implementations are blocking.
pub trait Diarizer: Send + Sync {
    /// Split a window into speaker turns, ordered by start time.
    fn diarize(&self, window: &AudioWindow) -> Result<Vec<SpeakerTurn>>;

    /// Whether the engine can produce turns at all.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

impl<T: Diarizer> Diarizer for Arc<T> {
    fn diarize(&self, window: &AudioWindow) -> Result<Vec<SpeakerTurn>> {
        (**self).diarize(window)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Diarizer used when no engine is configured. Always returns no turns.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDiarizer;

impl Diarizer for DisabledDiarizer {
    fn diarize(&self, _window: &AudioWindow) -> Result<Vec<SpeakerTurn>> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Mock diarizer for testing
#[derive(Debug, Clone, Default)]
pub struct MockDiarizer {
    turns: Vec<SpeakerTurn>,
    should_fail: bool,
}

impl MockDiarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the turns returned on every call
    pub fn with_turns(mut self, turns: Vec<SpeakerTurn>) -> Self {
        self.turns = turns;
        self
    }

    /// Configure the mock to fail on diarize
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Diarizer for MockDiarizer {
    fn diarize(&self, _window: &AudioWindow) -> Result<Vec<SpeakerTurn>> {
        if self.should_fail {
            return Err(LivescribeError::Diarization {
                message: "mock diarization failure".to_string(),
            });
        }
        Ok(self.turns.clone())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "mock"
    }
}
