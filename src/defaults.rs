//! Default configuration constants for livescribe.
//!
//! Shared between the config structs, the session engine and the tests so the
//! numbers live in one place.

/// Sample rate of every audio window handed to an engine, in Hz.
///
/// Streaming clients must send 16-bit little-endian mono PCM at this rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per PCM sample on the wire (signed 16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Buffered duration that triggers a transcription window, in seconds.
///
/// Longer windows give the model more context and better punctuation at the
/// cost of latency before the first partial result.
pub const BUFFER_SECS: f32 = 12.0;

/// Windows shorter than this are never submitted to an engine, in seconds.
pub const MIN_AUDIO_SECS: f32 = 1.0;

/// Trailing audio kept after each window so the next one overlaps it.
pub const OVERLAP_SECS: f32 = 2.0;

/// Minimum RMS energy for a window to be worth transcribing.
///
/// Windows below this are silence or line noise and skip the engine entirely.
pub const MIN_ENERGY_FOR_TRANSCRIPTION: f32 = 0.001;

/// Concurrent streaming sessions allowed per source address.
pub const MAX_SESSIONS_PER_ADDRESS: usize = 3;

/// Cap on the diarization history kept per session, in seconds.
pub const MAX_HISTORY_SECS: u32 = 2 * 60 * 60;

/// Largest binary frame accepted from a streaming client.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Largest request body accepted by the batch endpoint.
pub const MAX_BATCH_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Local whisper.cpp model used when no path is configured.
pub const MODEL_PATH: &str = "models/ggml-large-v3.bin";

/// Model name sent to a remote OpenAI-compatible transcription API.
pub const REMOTE_MODEL: &str = "whisper-1";

/// Default language code passed to the transcription engine.
pub const DEFAULT_LANGUAGE: &str = "pl";

/// Base priming prompt. Biases the model towards punctuated, capitalized output.
pub const DEFAULT_PROMPT: &str = "Transkrypcja profesjonalnej rozmowy po polsku. \
Mówca używa poprawnej polszczyzny, terminologii branżowej. Interpunkcja i wielkie litery.";

/// Characters of prior transcript appended to the priming prompt.
pub const PROMPT_TAIL_CHARS: usize = 300;

/// Label prefix used when rendering speaker blocks.
pub const SPEAKER_LABEL: &str = "Mówca";

/// Lifetime of a signed stream token, in seconds.
pub const TOKEN_TTL_SECS: u64 = 60;

/// Tolerated clock skew for signed tokens issued "in the future", in seconds.
pub const TOKEN_CLOCK_SKEW_SECS: u64 = 5;

/// Engine calls allowed to run at the same time across all sessions.
///
/// One per engine instance: a single accelerator serializes anyway.
pub const MAX_CONCURRENT_INFERENCES: usize = 1;

/// Upper bound on a single engine call, in seconds.
pub const ENGINE_TIMEOUT_SECS: u64 = 300;

/// Default listen address.
pub const HOST: &str = "0.0.0.0";

/// Default listen port.
pub const PORT: u16 = 8765;

/// Origins always allowed by CORS for local development.
pub const LOCAL_DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
    "tauri://localhost",
];

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// Only one GPU backend can be active at a time; if none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}
