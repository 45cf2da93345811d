//! Speaker-word alignment.
//!
//! Fuses word timestamps from the transcription engine with speaker turns from
//! the diarization engine into ordered, speaker-labeled blocks.

use crate::diarize::SpeakerTurn;
use crate::stt::Word;
use crate::text::normalizer::Normalizer;
use std::collections::{HashMap, HashSet};

/// Display label for words that overlap no speaker turn.
pub const UNASSIGNED_LABEL: usize = 0;

/// Externally visible unit of a speaker-labeled transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerBlock {
    /// Ordinal in first-seen order, starting at 1. `UNASSIGNED_LABEL` for orphan words.
    pub label: usize,
    pub text: String,
}

fn overlap(word: &Word, turn: &SpeakerTurn) -> f32 {
    word.end.min(turn.end) - word.start.max(turn.start)
}

/// Index of the turn with the largest positive overlap; the first one wins ties.
fn best_turn(word: &Word, turns: &[SpeakerTurn]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, turn) in turns.iter().enumerate() {
        let amount = overlap(word, turn);
        if amount <= 0.0 {
            continue;
        }
        if best.is_none_or(|(_, top)| amount > top) {
            best = Some((idx, amount));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Assign each word to a speaker and group consecutive words into blocks.
///
/// A new block starts exactly when the assigned speaker tag changes. Engine
/// tags become ordinals 1, 2, ... in order of first appearance. With no turns
/// every word lands in a single `UNASSIGNED_LABEL` block; with no words the
/// result is empty.
pub fn align(words: &[Word], turns: &[SpeakerTurn]) -> Vec<SpeakerBlock> {
    let mut ordinals: HashMap<&str, usize> = HashMap::new();
    let mut blocks: Vec<SpeakerBlock> = Vec::new();
    let mut current_tag: Option<Option<&str>> = None;

    for word in words {
        let token = word.token.trim();
        if token.is_empty() {
            continue;
        }
        let tag = best_turn(word, turns).map(|idx| turns[idx].speaker.as_str());
        let label = match tag {
            Some(tag) => {
                let next = ordinals.len() + 1;
                *ordinals.entry(tag).or_insert(next)
            }
            None => UNASSIGNED_LABEL,
        };

        match blocks.last_mut() {
            Some(block) if current_tag == Some(tag) => {
                block.text.push(' ');
                block.text.push_str(token);
            }
            _ => blocks.push(SpeakerBlock {
                label,
                text: token.to_string(),
            }),
        }
        current_tag = Some(tag);
    }
    blocks
}

/// Normalize each block, drop the ones that end up empty and merge
/// neighbours that now share a label.
pub fn normalize_blocks(blocks: Vec<SpeakerBlock>, normalizer: &Normalizer) -> Vec<SpeakerBlock> {
    let mut out: Vec<SpeakerBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let text = normalizer.normalize(&block.text);
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(previous) if previous.label == block.label => {
                previous.text.push(' ');
                previous.text.push_str(&text);
            }
            _ => out.push(SpeakerBlock {
                label: block.label,
                text,
            }),
        }
    }
    out
}

/// Render blocks as `[<prefix> <n>] <text>` separated by blank lines.
pub fn render_blocks(blocks: &[SpeakerBlock], label_prefix: &str) -> String {
    blocks
        .iter()
        .map(|b| format!("[{} {}] {}", label_prefix, b.label, b.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Number of distinct display labels used.
pub fn speaker_count(blocks: &[SpeakerBlock]) -> usize {
    blocks.iter().map(|b| b.label).collect::<HashSet<_>>().len()
}
