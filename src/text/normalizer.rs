//! Deterministic cleanup of engine output.
//!
//! Steps run in a fixed order: hallucination filter, filler removal,
//! repetition collapse, whitespace/punctuation tidy, capitalization and
//! terminal punctuation. Later steps assume the earlier ones already ran.
//! `normalize(normalize(x)) == normalize(x)` for every input.

use crate::error::{LivescribeError, Result};
use regex::{Captures, Regex};

/// Phrases models confabulate on silence or noise. Matched whole, lower-cased,
/// after trailing periods and whitespace are stripped.
pub const HALLUCINATIONS: &[&str] = &[
    "wszelkie prawa zastrzeżone",
    "napisy stworzone przez",
    "napisy wykonał",
    "subskrybuj",
    "subscribe",
    "dziękuję za uwagę",
    "dziękuję za obejrzenie",
    "do zobaczenia",
    "thanks for watching",
    "copyright",
    "all rights reserved",
    "tłumaczenie",
    "amara.org",
];

/// Elongated interjections, removed in every language.
const INTERJECTIONS: &str = r"(?i)\b(?:ee+|yyy+|hmm+|aaa+|mmm+)\b";

const POLISH_FILLERS: &[&str] = &[
    // "no-" starts a compound ("no-name") and stays
    r"(?i)\b(?:no|noo|nooo)\b(-)?",
    r"(?i)\bznaczy\b",
    r"(?i)\bwiesz\b",
    r"(?i)\btak\s+jakby\b",
];

const ENGLISH_FILLERS: &[&str] = &[
    r"(?i)\b(?:um+|uh+|erm)\b",
    r"(?i)\byou\s+know\b",
    r"(?i)\bi\s+mean\b",
];

/// Filler patterns for a language code. Unknown languages get interjections only.
pub fn fillers_for(language: &str) -> Vec<&'static str> {
    let mut patterns = match language.to_ascii_lowercase().as_str() {
        "pl" => POLISH_FILLERS.to_vec(),
        "en" => ENGLISH_FILLERS.to_vec(),
        _ => Vec::new(),
    };
    patterns.push(INTERJECTIONS);
    patterns
}

#[derive(Debug, Clone)]
struct Tidy {
    comma_runs: Regex,
    space_before_punct: Regex,
    comma_before_stop: Regex,
    whitespace: Regex,
    sentence_start: Regex,
    word: Regex,
}

impl Tidy {
    fn new() -> Result<Self> {
        Ok(Self {
            comma_runs: compile(r"\s*,(?:\s*,)+")?,
            space_before_punct: compile(r"\s+([.,!?])")?,
            comma_before_stop: compile(r",+([.!?])")?,
            whitespace: compile(r"\s+")?,
            sentence_start: compile(r"\.\s+(\p{Ll})")?,
            word: compile(r"\w+")?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| LivescribeError::Other(format!("Invalid pattern {pattern}: {e}")))
}

/// Text normalizer for one language.
///
/// Built once at startup and shared; `normalize` takes `&self` and performs
/// no I/O.
#[derive(Debug, Clone)]
pub struct Normalizer {
    denylist: Vec<String>,
    fillers: Vec<Regex>,
    tidy: Tidy,
}

impl Normalizer {
    /// Create a normalizer for `language`, adding `extra_hallucinations` to the denylist.
    pub fn new(language: &str, extra_hallucinations: &[String]) -> Result<Self> {
        let mut denylist: Vec<String> = HALLUCINATIONS.iter().map(|p| p.to_string()).collect();
        for phrase in extra_hallucinations {
            let phrase = canonical(phrase);
            if !phrase.is_empty() && !denylist.contains(&phrase) {
                denylist.push(phrase);
            }
        }
        let fillers = fillers_for(language)
            .into_iter()
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            denylist,
            fillers,
            tidy: Tidy::new()?,
        })
    }

    /// Whether `text` is exactly a known confabulation phrase.
    pub fn is_hallucination(&self, text: &str) -> bool {
        let lower = canonical(text);
        self.denylist.iter().any(|p| *p == lower)
    }

    /// Run the full cleanup pipeline. Returns an empty string for suppressed text.
    pub fn normalize(&self, text: &str) -> String {
        if text.trim().is_empty() || self.is_hallucination(text) {
            return String::new();
        }

        // Removing fillers can expose repeats and collapsing repeats can
        // expose multi-word fillers; both only shrink the text.
        let mut current = text.to_string();
        loop {
            let next = collapse_repeats(&self.tidy.word, &self.remove_fillers(&current));
            if next == current {
                break;
            }
            current = next;
        }

        let tidied = self.tidy(&current);
        if tidied.is_empty() {
            return String::new();
        }
        let result = terminate(&self.capitalize(&tidied));

        if self.is_hallucination(&result) {
            return String::new();
        }
        result
    }

    fn remove_fillers(&self, text: &str) -> String {
        let mut out = text.to_string();
        for filler in &self.fillers {
            out = filler
                .replace_all(&out, |caps: &Captures| {
                    if caps.get(1).is_some() {
                        caps[0].to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned();
        }
        out
    }

    fn tidy(&self, text: &str) -> String {
        let t = &self.tidy;
        let out = t.comma_runs.replace_all(text, ",");
        let out = t.space_before_punct.replace_all(&out, "$1");
        let out = t.comma_before_stop.replace_all(&out, "$1");
        let out = t.whitespace.replace_all(&out, " ");
        let out = out
            .trim_start_matches(|c: char| {
                matches!(c, ',' | '.' | ';' | ':' | '!' | '?') || c.is_whitespace()
            })
            .trim_end_matches(|c: char| c == ',' || c.is_whitespace());
        if !out.chars().any(char::is_alphanumeric) {
            return String::new();
        }
        out.to_string()
    }

    fn capitalize(&self, text: &str) -> String {
        let out = self
            .tidy
            .sentence_start
            .replace_all(text, |caps: &Captures| {
                let upper: String = caps[1].to_uppercase();
                caps[0].replacen(&caps[1], &upper, 1)
            });
        let mut chars = out.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Lower-case, trim, drop trailing periods.
fn canonical(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_lowercase()
}

/// Collapse immediately repeated words ("to to to" -> "to"), case-insensitive.
///
/// Only words separated by whitespace alone count as repeats.
fn collapse_repeats(word: &Regex, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut previous: Option<regex::Match> = None;
    for current in word.find_iter(text) {
        if let Some(prev) = previous {
            let gap = &text[prev.end()..current.start()];
            let repeated = !gap.is_empty()
                && gap.chars().all(char::is_whitespace)
                && prev.as_str().to_lowercase() == current.as_str().to_lowercase();
            if repeated {
                copied_to = current.end();
                previous = Some(current);
                continue;
            }
        }
        out.push_str(&text[copied_to..current.end()]);
        copied_to = current.end();
        previous = Some(current);
    }
    out.push_str(&text[copied_to..]);
    out
}

fn terminate(text: &str) -> String {
    if text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}
