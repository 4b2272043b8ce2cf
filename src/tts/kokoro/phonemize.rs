//! English grapheme-to-phoneme conversion and token mapping.
//!
//! Text is lightly normalized, phonemized with `misaki-rs`, then mapped
//! character by character through the model's `tokens.txt` table.

use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Thin wrapper around the `misaki-rs` G2P.
pub struct Phonemizer {
    g2p: misaki_rs::G2P,
}

impl Phonemizer {
    /// American English phonemizer.
    pub fn new() -> Self {
        Self {
            g2p: misaki_rs::G2P::new(misaki_rs::Language::EnglishUS),
        }
    }

    /// Convert one sentence to an IPA string.
    ///
    /// # Errors
    ///
    /// Returns an error if G2P fails or yields nothing.
    pub fn phonemize(&self, text: &str) -> Result<String> {
        let normalized = normalize_text(text);
        let (phonemes, _tokens) = self
            .g2p
            .g2p(&normalized)
            .map_err(|e| PipelineError::Tts(format!("phonemization failed: {e}")))?;
        if phonemes.trim().is_empty() {
            return Err(PipelineError::Tts(
                "phonemization produced empty output".into(),
            ));
        }
        Ok(phonemes)
    }
}

impl Default for Phonemizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbol → id table read from `tokens.txt`.
#[derive(Debug, Clone)]
pub struct TokenTable {
    ids: HashMap<char, i64>,
}

impl TokenTable {
    /// Load a table of `<symbol> <id>` lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or has no usable entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Tts(format!("failed to read tokens {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parse `tokens.txt` content.
    ///
    /// The id is the last whitespace-separated field; an empty symbol is the
    /// space character. Multi-character symbols are ignored since phoneme
    /// strings are mapped one character at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if no line yields an entry.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut ids = HashMap::new();
        for line in raw.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            let Some((symbol, id)) = line.rsplit_once(' ') else {
                continue;
            };
            let Ok(id) = id.trim().parse::<i64>() else {
                continue;
            };
            let mut chars = if symbol.is_empty() { " " } else { symbol }.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                ids.insert(c, id);
            }
        }
        if ids.is_empty() {
            return Err(PipelineError::Tts("token table is empty".into()));
        }
        Ok(Self { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Map a phoneme string to ids wrapped in pad tokens (id 0).
    /// Characters missing from the table are dropped.
    pub fn encode(&self, phonemes: &str) -> Vec<i64> {
        let mut out = Vec::with_capacity(phonemes.len() + 2);
        out.push(0);
        out.extend(phonemes.chars().filter_map(|c| self.ids.get(&c).copied()));
        out.push(0);
        out
    }
}

/// Normalize quotes and dashes, strip markdown emphasis, and spell out
/// currency amounts.
pub fn normalize_text(text: &str) -> String {
    let text = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2014}', '\u{2013}'], " - ");
    let text: String = text
        .trim_start_matches('#')
        .trim_start()
        .chars()
        .filter(|&c| c != '*')
        .collect();
    expand_currency(&text)
}

/// `$5` → `5 dollars`. Symbols not followed by digits are kept.
fn expand_currency(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let word = match c {
            '$' => "dollars",
            '£' => "pounds",
            '€' => "euros",
            _ => {
                out.push(c);
                continue;
            }
        };
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        if digits.is_empty() {
            out.push(c);
        } else {
            out.push_str(&digits);
            out.push(' ');
            out.push_str(word);
        }
    }
    out
}
