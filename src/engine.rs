//! Shared inference engines behind a bounded-concurrency gate.
//!
//! Engines are process-wide singletons. Every call takes a permit from one
//! semaphore sized to the number of engine instances and runs on tokio's
//! blocking pool, so sessions suspend instead of stalling the runtime. Calls
//! are never abandoned: past the timeout the caller logs a warning and keeps
//! waiting, so a session never has more than one window inside an engine.

use crate::audio::AudioWindow;
use crate::defaults;
use crate::diarize::{Diarizer, SpeakerTurn};
use crate::error::{LivescribeError, Result};
use crate::stt::{PromptPolicy, Transcriber, Transcript, TranscriptionRequest};
use crate::text::{self, Normalizer, SpeakerBlock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy)]
enum Stage {
    Transcription,
    Diarization,
}

impl Stage {
    fn error(self, message: String) -> LivescribeError {
        match self {
            Stage::Transcription => LivescribeError::Transcription { message },
            Stage::Diarization => LivescribeError::Diarization { message },
        }
    }
}

/// Result of analysing one window: normalized plain text and, when
/// diarization produced turns, speaker blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub text: String,
    pub blocks: Option<Vec<SpeakerBlock>>,
}

impl Analysis {
    /// Speaker-labeled rendering, if diarization was available.
    pub fn diarized_text(&self, label_prefix: &str) -> Option<String> {
        self.blocks
            .as_ref()
            .map(|blocks| text::render_blocks(blocks, label_prefix))
    }

    pub fn speaker_count(&self) -> Option<usize> {
        self.blocks.as_ref().map(|blocks| text::speaker_count(blocks))
    }
}

/// Transcription and diarization engines plus the text pipeline they feed.
#[derive(Clone)]
pub struct Engines {
    transcriber: Arc<dyn Transcriber>,
    diarizer: Arc<dyn Diarizer>,
    normalizer: Arc<Normalizer>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    language: String,
    prompt: PromptPolicy,
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines")
            .field("model", &self.transcriber.model_name())
            .field("diarizer", &self.diarizer.name())
            .field("timeout", &self.timeout)
            .field("language", &self.language)
            .finish()
    }
}

impl Engines {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        diarizer: Arc<dyn Diarizer>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            transcriber,
            diarizer,
            normalizer: Arc::new(normalizer),
            permits: Arc::new(Semaphore::new(defaults::MAX_CONCURRENT_INFERENCES)),
            timeout: Duration::from_secs(defaults::ENGINE_TIMEOUT_SECS),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            prompt: PromptPolicy::default(),
        }
    }

    /// Number of engine calls allowed to run at once (at least one).
    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: PromptPolicy) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn model_name(&self) -> &str {
        self.transcriber.model_name()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn diarization_available(&self) -> bool {
        self.diarizer.is_available()
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Run a blocking engine call under the gate.
    ///
    /// The call always runs to completion and its result is returned; the
    /// timeout only marks it as slow.
    async fn gated<T, F>(&self, stage: Stage, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| stage.error(format!("Engine gate closed: {e}")))?;

        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call()
        });

        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    ?stage,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Engine call exceeded its timeout, waiting for it to finish"
                );
                task.await
            }
        };
        joined.map_err(|e| stage.error(format!("Engine task panicked: {e}")))?
    }

    /// Transcribe a window with the given request.
    pub async fn transcribe(
        &self,
        window: AudioWindow,
        request: TranscriptionRequest,
    ) -> Result<Transcript> {
        let transcriber = Arc::clone(&self.transcriber);
        let seconds = window.duration_secs();
        let started = Instant::now();
        let transcript = self
            .gated(Stage::Transcription, move || {
                transcriber.transcribe(&window, &request)
            })
            .await?;
        tracing::debug!(
            audio_secs = seconds,
            elapsed_ms = started.elapsed().as_millis() as u64,
            segments = transcript.segments.len(),
            words = transcript.words.len(),
            "Window transcribed"
        );
        Ok(transcript)
    }

    /// Diarize a window. Engine failures degrade to "no turns".
    pub async fn diarize(&self, window: AudioWindow) -> Vec<SpeakerTurn> {
        if !self.diarizer.is_available() {
            return Vec::new();
        }
        let diarizer = Arc::clone(&self.diarizer);
        match self
            .gated(Stage::Diarization, move || diarizer.diarize(&window))
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(error = %e, "Diarization unavailable, falling back to plain text");
                Vec::new()
            }
        }
    }

    /// Transcribe one streaming window primed with the session's transcript so far.
    ///
    /// Returns normalized text; empty means nothing worth surfacing.
    pub async fn transcribe_window(&self, window: AudioWindow, history: &str) -> Result<String> {
        let request = TranscriptionRequest {
            language: self.language.clone(),
            prompt: self.prompt.build(history),
            word_timestamps: false,
        };
        let transcript = self.transcribe(window, request).await?;
        Ok(self.normalizer.normalize(&transcript.text()))
    }

    /// Full analysis of a complete recording: plain text plus speaker blocks
    /// when `diarize` is set and the diarizer yields turns.
    pub async fn analyze(
        &self,
        window: AudioWindow,
        language: Option<&str>,
        diarize: bool,
    ) -> Result<Analysis> {
        let turns = if diarize {
            self.diarize(window.clone()).await
        } else {
            Vec::new()
        };

        let request = TranscriptionRequest {
            language: language.unwrap_or(&self.language).to_string(),
            prompt: self.prompt.build(""),
            word_timestamps: !turns.is_empty(),
        };
        let transcript = self.transcribe(window, request).await?;
        let text = self.normalizer.normalize(&transcript.text());

        let blocks = if turns.is_empty() {
            None
        } else {
            let aligned = text::align(&transcript.words, &turns);
            Some(text::normalize_blocks(aligned, &self.normalizer))
        };

        Ok(Analysis { text, blocks })
    }
}
