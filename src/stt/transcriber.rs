use crate::audio::AudioWindow;
use crate::defaults;
use crate::error::{LivescribeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A timed stretch of recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f32,
    pub end: f32,
    pub text: String,
}

/// A single recognized word with timing, used for speaker alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub start: f32,
    pub end: f32,
    pub token: String,
}

impl Word {
    pub fn new(start: f32, end: f32, token: &str) -> Self {
        Self {
            start,
            end,
            token: token.to_string(),
        }
    }
}

/// Raw engine output for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub words: Vec<Word>,
}

impl Transcript {
    /// Creates a transcript holding a single untimed segment.
    pub fn from_text(text: &str) -> Self {
        Self {
            segments: vec![Segment {
                start: 0.0,
                end: 0.0,
                text: text.to_string(),
            }],
            words: Vec::new(),
        }
    }

    /// Segment texts, trimmed and joined with single spaces.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-call decoding options.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub language: String,
    /// Priming text for the decoder. `None` disables priming.
    pub prompt: Option<String>,
    /// Ask the engine for per-word timestamps.
    pub word_timestamps: bool,
}

impl Default for TranscriptionRequest {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            prompt: None,
            word_timestamps: false,
        }
    }
}

/// Trait for speech-to-text transcription.
///
/// Implementations are blocking; callers run them on a worker thread.
pub trait Transcriber: Send + Sync {
    /// Transcribe a 16kHz mono window.
    fn transcribe(&self, window: &AudioWindow, request: &TranscriptionRequest)
    -> Result<Transcript>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(
        &self,
        window: &AudioWindow,
        request: &TranscriptionRequest,
    ) -> Result<Transcript> {
        (**self).transcribe(window, request)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Builds the priming prompt from a base text and the session's transcript so far.
#[derive(Debug, Clone)]
pub struct PromptPolicy {
    pub base: String,
    pub tail_chars: usize,
}

impl PromptPolicy {
    pub fn new(base: &str, tail_chars: usize) -> Self {
        Self {
            base: base.to_string(),
            tail_chars,
        }
    }

    /// Base prompt followed by the last `tail_chars` characters of `history`.
    pub fn build(&self, history: &str) -> Option<String> {
        let tail = tail_chars(history, self.tail_chars).trim();
        let base = self.base.trim();
        let prompt = match (base.is_empty(), tail.is_empty()) {
            (true, true) => return None,
            (false, true) => base.to_string(),
            (true, false) => tail.to_string(),
            (false, false) => format!("{base} {tail}"),
        };
        Some(prompt)
    }
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self::new(defaults::DEFAULT_PROMPT, defaults::PROMPT_TAIL_CHARS)
    }
}

fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Mock transcriber for testing
#[derive(Debug)]
pub struct MockTranscriber {
    model_name: String,
    responses: Vec<String>,
    words: Vec<Word>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            responses: vec!["mock transcription".to_string()],
            words: Vec::new(),
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// Configure the mock to return responses in order, repeating the last one.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Configure word timings returned when word timestamps are requested.
    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of transcribe calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(
        &self,
        window: &AudioWindow,
        request: &TranscriptionRequest,
    ) -> Result<Transcript> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(LivescribeError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let text = self
            .responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        let words = if request.word_timestamps {
            self.words.clone()
        } else {
            Vec::new()
        };
        Ok(Transcript {
            segments: vec![Segment {
                start: 0.0,
                end: window.duration_secs(),
                text,
            }],
            words,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
