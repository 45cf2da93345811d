//! Error types for livescribe.

use thiserror::Error;

/// WebSocket close code sent after a normal final transcript.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for a frame larger than the configured limit.
pub const CLOSE_TOO_BIG: u16 = 1009;
/// WebSocket close code for a missing or invalid credential.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// WebSocket close code for a source address over its session cap.
pub const CLOSE_RATE_LIMITED: u16 = 4029;

#[derive(Error, Debug)]
pub enum LivescribeError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Client protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Frame too large: {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    // Connection admission
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Too many concurrent sessions from {address}")]
    AdmissionRejected { address: String },

    // Engine errors
    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Diarization failed: {message}")]
    Diarization { message: String },

    // Batch payload errors
    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl LivescribeError {
    /// WebSocket close code for errors that end a streaming session.
    ///
    /// Returns `None` for errors the session survives.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(CLOSE_UNAUTHORIZED),
            Self::AdmissionRejected { .. } => Some(CLOSE_RATE_LIMITED),
            Self::FrameTooLarge { .. } => Some(CLOSE_TOO_BIG),
            _ => None,
        }
    }

    /// Numeric code carried in the `code` field of an outgoing error message.
    pub fn message_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => CLOSE_UNAUTHORIZED,
            Self::AdmissionRejected { .. } => CLOSE_RATE_LIMITED,
            Self::FrameTooLarge { .. } => CLOSE_TOO_BIG,
            Self::Protocol { .. } | Self::Decode { .. } => 400,
            _ => 500,
        }
    }

    /// HTTP status for the batch endpoint.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::AdmissionRejected { .. } => 429,
            Self::Protocol { .. } | Self::Decode { .. } => 400,
            Self::FrameTooLarge { .. } => 413,
            _ => 500,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LivescribeError>;
