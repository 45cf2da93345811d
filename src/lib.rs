//! livescribe - zero-retention streaming transcription server
//!
//! Clients stream 16 kHz PCM over a WebSocket and get incremental transcripts
//! back, optionally with speaker labels. Audio only ever lives in memory.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod admission;
pub mod app;
pub mod audio;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod diarize;
pub mod engine;
pub mod error;
pub mod server;
pub mod session;
pub mod stt;
pub mod text;

// Engine contracts
pub use diarize::{Diarizer, SpeakerTurn};
pub use stt::transcriber::Transcriber;

// Session engine
pub use admission::AdmissionController;
pub use audio::{AudioWindow, FrameBuffer, OverlapPolicy};
pub use engine::{Analysis, Engines};
pub use session::{SessionContext, SessionOutcome, Transport, run_session};
pub use text::Normalizer;

// Error handling
pub use error::{LivescribeError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
