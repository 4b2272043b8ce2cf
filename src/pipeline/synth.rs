//! Ordered per-sentence synthesis.
//!
//! Sentences are generated strictly in input order, one at a time, and each
//! buffer is handed to the sink before the next sentence starts. A sentence
//! whose generation fails or comes back empty is skipped.

use super::sentences::split_sentences;
use crate::error::Result;
use crate::tts::engine::GeneratedAudio;
use crate::tts::pool::PooledSession;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one synthesis request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisReport {
    /// Sentence units the text was split into.
    pub sentences: usize,
    /// Buffers handed to playback.
    pub played: usize,
    /// Sentences skipped after a failed or empty generation.
    pub skipped: usize,
    /// Time from start to the first successful playback hand-off.
    pub first_audio_latency: Option<Duration>,
    /// Set when playback rejected a buffer and the remaining sentences were
    /// not attempted.
    pub aborted: Option<String>,
}

impl SynthesisReport {
    /// Human-readable summary for status lines.
    pub fn summary(&self) -> String {
        let mut out = format!("{}/{} sentences played", self.played, self.sentences);
        if self.skipped > 0 {
            out.push_str(&format!(", {} skipped", self.skipped));
        }
        if let Some(latency) = self.first_audio_latency {
            out.push_str(&format!(", first audio after {} ms", latency.as_millis()));
        }
        out
    }
}

/// Generate every sentence of `text` on `session` and hand each buffer to `sink`.
///
/// Generation errors and empty buffers skip that sentence only. A sink error
/// stops the remaining sentences and is recorded in
/// [`SynthesisReport::aborted`]; it is not returned as an `Err`.
pub fn synthesize<F>(
    session: &PooledSession,
    text: &str,
    voice_id: u32,
    speed: f32,
    mut sink: F,
) -> SynthesisReport
where
    F: FnMut(GeneratedAudio) -> Result<()>,
{
    let start = Instant::now();
    let sentences = split_sentences(text);
    let language = session.language();
    let mut report = SynthesisReport {
        sentences: sentences.len(),
        ..SynthesisReport::default()
    };

    for (index, sentence) in sentences.iter().enumerate() {
        let audio = match session.generate(sentence, voice_id, speed) {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                warn!(%language, index, "generation returned no audio, skipping sentence");
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(%language, index, "generation failed, skipping sentence: {e}");
                report.skipped += 1;
                continue;
            }
        };

        if let Err(e) = sink(audio) {
            warn!(%language, index, "playback failed, abandoning remaining sentences: {e}");
            report.aborted = Some(e.to_string());
            break;
        }
        report.played += 1;
        if report.first_audio_latency.is_none() {
            let latency = start.elapsed();
            info!(%language, "first sentence ready in {} ms", latency.as_millis());
            report.first_audio_latency = Some(latency);
        }
    }

    info!(
        %language,
        sentences = report.sentences,
        played = report.played,
        skipped = report.skipped,
        "synthesis finished in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    report
}
