//! Whisper-based speech-to-text transcription.
//!
//! This module provides a Whisper implementation of the Transcriber trait using whisper-rs.
//!
//! # Feature Gate
//!
//! This module requires the `whisper` feature to be enabled and cmake to be installed.
//! To build with Whisper support:
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::audio::AudioWindow;
use crate::error::{LivescribeError, Result};
use crate::stt::transcriber::{Transcriber, Transcript, TranscriptionRequest};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use crate::stt::transcriber::Segment;
#[cfg(any(feature = "whisper", test))]
use crate::stt::transcriber::Word;
#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Beam width for deterministic decoding.
pub const BEAM_SIZE: i32 = 5;

/// Configuration for Whisper transcriber.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the Whisper model file
    pub model_path: PathBuf,
    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,
    /// Offload inference to the GPU backend compiled in, if any
    pub use_gpu: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(crate::defaults::MODEL_PATH),
            threads: None,
            use_gpu: true,
        }
    }
}

fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Whisper-based transcriber implementation.
///
/// The WhisperContext is wrapped in a Mutex; concurrent calls queue on it.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Whisper-based transcriber placeholder (without whisper feature).
///
/// This is a stub implementation that returns errors when used.
/// Enable the `whisper` feature to use real transcription.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load a Whisper model.
    ///
    /// # Errors
    /// Returns `LivescribeError::TranscriptionModelNotFound` if the model file doesn't exist
    /// Returns `LivescribeError::Transcription` if model loading fails
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // Install logging hooks to route whisper.cpp output away from stdout (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(LivescribeError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(config.use_gpu);
        // Fused attention kernels avoid the standalone softmax kernel that crashes on sm_120
        context_params.flash_attn(true);
        let context = WhisperContext::new_with_params(
            config
                .model_path
                .to_str()
                .ok_or_else(|| LivescribeError::Transcription {
                    message: "Invalid UTF-8 in model path".to_string(),
                })?,
            context_params,
        )
        .map_err(|e| LivescribeError::Transcription {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        tracing::info!(
            model = %model_name,
            backend = crate::defaults::gpu_backend(),
            "Whisper model loaded"
        );

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Create a new Whisper transcriber (stub implementation).
    ///
    /// Only checks that the model file exists; transcription always fails.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(LivescribeError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);
        tracing::warn!(
            model = %model_name,
            "Built without the whisper feature; local transcription is unavailable"
        );

        Ok(Self { config, model_name })
    }

    /// Get the configuration
    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

/// Whisper marks special tokens as `[_...]` or `<|...|>`.
#[cfg(any(feature = "whisper", test))]
fn is_special_token(token: &str) -> bool {
    let trimmed = token.trim();
    trimmed.starts_with("[_") || trimmed.starts_with("<|")
}

/// Groups sub-word tokens into words. A leading space starts a new word.
///
/// Each input is `(text, start_secs, end_secs)`.
#[cfg(any(feature = "whisper", test))]
fn words_from_tokens(tokens: &[(String, f32, f32)]) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    for (text, start, end) in tokens {
        if text.is_empty() || is_special_token(text) {
            continue;
        }
        let starts_word = text.starts_with(char::is_whitespace);
        match words.last_mut() {
            Some(word) if !starts_word => {
                word.token.push_str(text);
                word.end = word.end.max(*end);
            }
            _ => {
                let token = text.trim_start();
                if token.is_empty() {
                    continue;
                }
                words.push(Word::new(*start, *end, token));
            }
        }
    }
    words
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(
        &self,
        window: &AudioWindow,
        request: &TranscriptionRequest,
    ) -> Result<Transcript> {
        let context = self
            .context
            .lock()
            .map_err(|e| LivescribeError::Transcription {
                message: format!("Failed to acquire context lock: {}", e),
            })?;

        let mut state = context
            .create_state()
            .map_err(|e| LivescribeError::Transcription {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        // Deterministic decoding: beam search, no temperature fallback
        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: BEAM_SIZE,
            patience: -1.0,
        });
        params.set_temperature(0.0);
        params.set_temperature_inc(0.0);
        params.set_no_context(true);
        params.set_suppress_blank(true);
        params.set_token_timestamps(request.word_timestamps);

        if request.language.is_empty() || request.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&request.language));
        }
        if let Some(prompt) = request.prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, window.samples())
            .map_err(|e| LivescribeError::Transcription {
                message: format!("Whisper inference failed: {}", e),
            })?;

        // Timestamps are in centiseconds
        let mut transcript = Transcript::default();
        for segment in state.as_iter() {
            transcript.segments.push(Segment {
                start: segment.start_timestamp() as f32 / 100.0,
                end: segment.end_timestamp() as f32 / 100.0,
                text: segment.to_string(),
            });

            if request.word_timestamps {
                let mut tokens = Vec::with_capacity(segment.n_tokens() as usize);
                for i in 0..segment.n_tokens() {
                    let Some(token) = segment.get_token(i) else {
                        continue;
                    };
                    let text = token
                        .to_str_lossy()
                        .map_err(|e| LivescribeError::Transcription {
                            message: format!("Failed to read token text: {}", e),
                        })?
                        .to_string();
                    let data = token.token_data();
                    tokens.push((text, data.t0 as f32 / 100.0, data.t1 as f32 / 100.0));
                }
                transcript.words.extend(words_from_tokens(&tokens));
            }
        }

        Ok(transcript)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(
        &self,
        _window: &AudioWindow,
        _request: &TranscriptionRequest,
    ) -> Result<Transcript> {
        Err(LivescribeError::Transcription {
            message: concat!(
                "Whisper feature not enabled. This binary was built without local speech recognition.\n",
                "To fix: cargo build --release --features whisper, or set stt.engine = \"remote\""
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
