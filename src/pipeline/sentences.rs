//! Sentence splitting for per-sentence synthesis.

/// Characters that end a sentence unit.
pub const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

/// Split `text` on `.`, `!`, `?` and newline, trimming each piece and
/// dropping empty ones.
///
/// Input without terminators yields itself as a single sentence. Blank input
/// yields nothing.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
