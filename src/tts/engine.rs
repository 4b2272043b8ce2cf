//! Seam to the neural inference engine.
//!
//! The engine is consumed as a black box: a [`SpeechEngine`] turns an
//! [`EngineConfig`] into an [`EngineSession`], and a session turns one
//! sentence into a [`GeneratedAudio`] buffer. Dropping a session destroys it.

use crate::error::Result;
use crate::language::Preprocessing;
use std::path::PathBuf;

/// Fully-resolved configuration for one language's session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Acoustic model file.
    pub model: PathBuf,
    /// Token / vocabulary table.
    pub tokens: PathBuf,
    /// Voice-embedding table (voice-embedding models only).
    pub voices: Option<PathBuf>,
    /// Phoneme lexicon (lexicon + dictionary models only).
    pub lexicon: Option<PathBuf>,
    /// Word-segmentation dictionary directory (lexicon + dictionary models only).
    pub dict_dir: Option<PathBuf>,
    /// Universal phonemizer data directory.
    pub data_dir: Option<PathBuf>,
    /// Inference threads.
    pub num_threads: u32,
    pub noise_scale: f32,
    pub noise_scale_w: f32,
    pub length_scale: f32,
    /// Verbose engine output.
    pub debug: bool,
    /// Compute provider identifier (`"cpu"`, `"coreml"`, `"cuda"`).
    pub provider: String,
    /// Preprocessing variant the paths above were selected for.
    pub preprocessing: Preprocessing,
}

/// One synthesized sentence: mono f32 PCM at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl GeneratedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Factory for inference sessions.
///
/// `create` is slow (model load) and blocking; callers run it on a worker
/// context and pay it at most once per language.
pub trait SpeechEngine: Send + Sync {
    /// Create a session for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot load the configuration.
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn EngineSession>>;
}

/// An initialized inference handle bound to one language.
pub trait EngineSession: Send {
    /// Number of voices / speakers the model offers.
    fn num_voices(&self) -> u32;

    /// Native output sample rate.
    fn sample_rate(&self) -> u32;

    /// Synthesize one sentence.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails. An empty buffer is a valid
    /// "nothing produced" result.
    fn generate(&mut self, text: &str, voice_id: u32, speed: f32) -> Result<GeneratedAudio>;
}
