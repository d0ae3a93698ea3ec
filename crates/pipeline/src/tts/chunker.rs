//! Paragraph and sentence chunking for TTS
//!
//! Splits a document into the ordered units the sequencer speaks one at a
//! time. An empty unit follows every paragraph as a pause marker.

use once_cell::sync::Lazy;
use regex::Regex;

/// Share of `max_len` before which a hard wrap will not back up to a space
pub const BACKTRACK_RATIO: f64 = 0.6;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{2,}").expect("paragraph pattern is valid"));

static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"));

/// Partition `text` into speakable units of at most `max_len` characters.
///
/// Words longer than `max_len` are cut at `max_len`. `max_len` must be
/// positive.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    debug_assert!(max_len > 0, "chunk size must be positive");
    let max_len = max_len.max(1);

    let normalized = text.replace("\r\n", "\n");
    let mut units = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(&normalized) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        for sentence in split_sentences(paragraph) {
            let sentence = sentence.trim();
            if sentence.chars().count() <= max_len {
                units.push(sentence.to_string());
            } else {
                hard_wrap(sentence, max_len, &mut units);
            }
        }

        // Paragraph break pause
        units.push(String::new());
    }

    units
}

/// Split after `.`, `!` or `?` followed by whitespace
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BREAK.find_iter(paragraph) {
        // Terminal punctuation is a single byte and stays with its sentence
        let end = boundary.start() + 1;
        segments.push(&paragraph[start..end]);
        start = boundary.end();
    }
    segments.push(&paragraph[start..]);

    segments.retain(|s| !s.is_empty());
    segments
}

/// Cut an over-long segment into `max_len` slices, backing up to the last
/// space when it sits at or past `BACKTRACK_RATIO * max_len`.
fn hard_wrap(segment: &str, max_len: usize, units: &mut Vec<String>) {
    let chars: Vec<char> = segment.chars().collect();
    let threshold = max_len as f64 * BACKTRACK_RATIO;
    let mut pos = 0;

    while pos < chars.len() {
        let end = (pos + max_len).min(chars.len());
        let mut slice = &chars[pos..end];

        if let Some(space) = slice.iter().rposition(|&c| c == ' ') {
            if space as f64 >= threshold {
                slice = &slice[..space];
            }
        }

        let piece: String = slice.iter().collect();
        units.push(piece.trim().to_string());
        pos += slice.len();
    }
}
