//! Speech-to-text engines behind the [`Transcriber`] trait.

#[cfg(feature = "remote-engines")]
pub mod remote;
pub mod transcriber;
pub mod whisper;

pub use transcriber::{
    MockTranscriber, PromptPolicy, Segment, Transcriber, Transcript, TranscriptionRequest, Word,
};
