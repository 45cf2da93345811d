//! Transcript text processing: cleanup and speaker alignment.

pub mod aligner;
pub mod normalizer;

pub use aligner::{SpeakerBlock, align, normalize_blocks, render_blocks, speaker_count};
pub use normalizer::Normalizer;
