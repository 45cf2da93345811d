use crate::audio::OverlapPolicy;
use crate::auth::{ApiKeyAuth, StreamAuth};
use crate::defaults;
use crate::error::{LivescribeError, Result};
use crate::session::StreamSettings;
use crate::stt::PromptPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub stream: StreamConfig,
    pub stt: SttConfig,
    pub diarization: DiarizationConfig,
    pub engine: EngineConfig,
    pub text: TextConfig,
}

/// Listener and HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_bytes: usize,
    pub max_batch_body_bytes: usize,
    /// Take the source address from the first `X-Forwarded-For` entry.
    pub trust_forwarded_for: bool,
    /// Allowed browser origins, on top of the local development ones.
    pub cors_origins: Vec<String>,
}

/// Credentials. Empty values mean "not configured".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub stream_token: Option<String>,
    pub token_secret: Option<String>,
    pub token_ttl_secs: u64,
    pub batch_api_key: Option<String>,
}

/// Streaming window tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub buffer_secs: f32,
    pub min_audio_secs: f32,
    pub overlap_secs: f32,
    /// When false the buffer is cleared after each window instead of keeping an overlap.
    pub retain_overlap: bool,
    pub min_energy: f32,
    pub max_sessions_per_address: usize,
    pub max_history_secs: u32,
}

/// Which transcription engine backs the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SttEngine {
    Whisper,
    Remote,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub engine: SttEngine,
    pub model_path: PathBuf,
    /// Base URL of an OpenAI-compatible transcription API.
    pub endpoint: Option<String>,
    pub remote_model: String,
    pub api_key: Option<String>,
    pub language: String,
    pub prompt: String,
    pub prompt_tail_chars: usize,
    pub threads: Option<usize>,
    pub use_gpu: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiarizationConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Prefix of rendered speaker labels, e.g. `[Mówca 1]`.
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_inferences: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TextConfig {
    /// Phrases suppressed on top of the built-in hallucination list.
    pub extra_hallucinations: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            max_frame_bytes: defaults::MAX_FRAME_BYTES,
            max_batch_body_bytes: defaults::MAX_BATCH_BODY_BYTES,
            trust_forwarded_for: false,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            stream_token: None,
            token_secret: None,
            token_ttl_secs: defaults::TOKEN_TTL_SECS,
            batch_api_key: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_secs: defaults::BUFFER_SECS,
            min_audio_secs: defaults::MIN_AUDIO_SECS,
            overlap_secs: defaults::OVERLAP_SECS,
            retain_overlap: true,
            min_energy: defaults::MIN_ENERGY_FOR_TRANSCRIPTION,
            max_sessions_per_address: defaults::MAX_SESSIONS_PER_ADDRESS,
            max_history_secs: defaults::MAX_HISTORY_SECS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            engine: SttEngine::Whisper,
            model_path: PathBuf::from(defaults::MODEL_PATH),
            endpoint: None,
            remote_model: defaults::REMOTE_MODEL.to_string(),
            api_key: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            prompt: defaults::DEFAULT_PROMPT.to_string(),
            prompt_tail_chars: defaults::PROMPT_TAIL_CHARS,
            threads: None,
            use_gpu: true,
        }
    }
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            label: defaults::SPEAKER_LABEL.to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inferences: defaults::MAX_CONCURRENT_INFERENCES,
            timeout_secs: defaults::ENGINE_TIMEOUT_SECS,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> LivescribeError {
    LivescribeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults only if the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(LivescribeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Empty values are ignored.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        fn var(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }

        if let Some(host) = var("LIVESCRIBE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("LIVESCRIBE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| invalid("LIVESCRIBE_PORT", format!("not a port number: {port}")))?;
        }
        if let Some(token) = var("LIVESCRIBE_STREAM_TOKEN") {
            self.auth.stream_token = Some(token);
        }
        if let Some(secret) = var("LIVESCRIBE_TOKEN_SECRET") {
            self.auth.token_secret = Some(secret);
        }
        if let Some(key) = var("LIVESCRIBE_BATCH_API_KEY") {
            self.auth.batch_api_key = Some(key);
        }
        if let Some(model) = var("LIVESCRIBE_MODEL") {
            self.stt.model_path = PathBuf::from(model);
        }
        if let Some(language) = var("LIVESCRIBE_LANGUAGE") {
            self.stt.language = language;
        }
        if let Some(url) = var("LIVESCRIBE_STT_URL") {
            self.stt.endpoint = Some(url);
            self.stt.engine = SttEngine::Remote;
        }
        if let Some(url) = var("LIVESCRIBE_DIARIZATION_URL") {
            self.diarization.endpoint = Some(url);
            self.diarization.enabled = true;
        }
        if let Some(origins) = var("LIVESCRIBE_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(self)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;
        if !(stream.buffer_secs > 0.0) {
            return Err(invalid("stream.buffer_secs", "must be positive"));
        }
        if !(stream.min_audio_secs > 0.0) {
            return Err(invalid("stream.min_audio_secs", "must be positive"));
        }
        if stream.min_audio_secs > stream.buffer_secs {
            return Err(invalid(
                "stream.min_audio_secs",
                "must not exceed stream.buffer_secs",
            ));
        }
        if stream.overlap_secs < 0.0 {
            return Err(invalid("stream.overlap_secs", "must not be negative"));
        }
        if stream.retain_overlap && stream.overlap_secs >= stream.buffer_secs {
            return Err(invalid(
                "stream.overlap_secs",
                "must be shorter than stream.buffer_secs",
            ));
        }
        if stream.min_energy < 0.0 {
            return Err(invalid("stream.min_energy", "must not be negative"));
        }
        if stream.max_sessions_per_address == 0 {
            return Err(invalid("stream.max_sessions_per_address", "must be at least 1"));
        }
        if stream.max_history_secs == 0 {
            return Err(invalid("stream.max_history_secs", "must be positive"));
        }
        if self.engine.max_concurrent_inferences == 0 {
            return Err(invalid("engine.max_concurrent_inferences", "must be at least 1"));
        }
        if self.engine.timeout_secs == 0 {
            return Err(invalid("engine.timeout_secs", "must be positive"));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(invalid("auth.token_ttl_secs", "must be positive"));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(invalid("server.max_frame_bytes", "must be positive"));
        }
        if self.stt.engine == SttEngine::Remote && non_empty(self.stt.endpoint.as_ref()).is_none() {
            return Err(invalid("stt.endpoint", "required when stt.engine = \"remote\""));
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        if self.stream.retain_overlap {
            OverlapPolicy::Retain(self.stream.overlap_secs)
        } else {
            OverlapPolicy::Discard
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            buffer_secs: self.stream.buffer_secs,
            min_audio_secs: self.stream.min_audio_secs,
            overlap: self.overlap_policy(),
            min_energy: self.stream.min_energy,
            max_history_secs: self.stream.max_history_secs,
            max_frame_bytes: self.server.max_frame_bytes,
            speaker_label: self.diarization.label.clone(),
        }
    }

    pub fn stream_auth(&self) -> StreamAuth {
        StreamAuth::new(
            self.auth.stream_token.as_deref(),
            self.auth.token_secret.as_deref(),
            self.auth.token_ttl_secs,
        )
    }

    pub fn batch_auth(&self) -> ApiKeyAuth {
        ApiKeyAuth::new(self.auth.batch_api_key.as_deref())
    }

    pub fn prompt_policy(&self) -> PromptPolicy {
        PromptPolicy::new(&self.stt.prompt, self.stt.prompt_tail_chars)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }

    /// Diarization endpoint, if diarization is switched on and has somewhere to go.
    pub fn diarization_endpoint(&self) -> Option<&str> {
        if !self.diarization.enabled {
            return None;
        }
        non_empty(self.diarization.endpoint.as_ref())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/livescribe/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("livescribe").join("config.toml"))
            .ok_or_else(|| LivescribeError::Other("Could not determine config directory".into()))
    }
}
