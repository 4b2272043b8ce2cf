//! Error types for the model and audio pipeline.

use crate::language::Language;

/// Top-level error type for model acquisition, inference and playback.
///
/// Every variant is terminal for the current operation only (one download,
/// one language switch, one sentence). The controller turns each of them into
/// a status line for the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Archive fetch failed (network, non-2xx response, empty payload).
    #[error("download error: {0}")]
    Download(String),

    /// Archive decompression or unpacking failed.
    #[error("extraction error: {0}")]
    Extract(String),

    /// The language has no model directory on disk.
    #[error("model not downloaded: {0}")]
    NotDownloaded(Language),

    /// Required artifacts are absent from a downloaded language directory.
    #[error("missing model files for {language}: {}", files.join(", "))]
    MissingFiles {
        /// Language whose directory was checked.
        language: Language,
        /// File names that did not resolve.
        files: Vec<String>,
    },

    /// The inference engine refused to create a session.
    #[error("initialization error: {0}")]
    EngineInit(String),

    /// Per-sentence generation error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error between worker contexts.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
