//! ONNX Runtime backend for voice-embedding (Kokoro) models.
//!
//! phonemize → tokenize → ONNX inference → 24 kHz audio.

use super::phonemize::{Phonemizer, TokenTable};
use crate::error::{PipelineError, Result};
use crate::language::Preprocessing;
use crate::tts::engine::{EngineConfig, EngineSession, GeneratedAudio, SpeechEngine};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Maximum context length (including pad tokens).
const MAX_CONTEXT: usize = 512;

/// Output sample rate in Hz.
const SAMPLE_RATE: u32 = 24_000;

/// Style vector width.
const STYLE_DIM: usize = 256;

/// Style rows per voice, indexed by token count.
const STYLE_ROWS: usize = 510;

/// Creates [`OnnxSession`]s with `ort`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxEngine;

impl SpeechEngine for OnnxEngine {
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn EngineSession>> {
        Ok(Box::new(OnnxSession::load(config)?))
    }
}

/// A loaded model, token table and voice table.
pub struct OnnxSession {
    session: Session,
    tokens: TokenTable,
    phonemizer: Phonemizer,
    /// Flat `(voices, STYLE_ROWS, STYLE_DIM)` table.
    voice_styles: Vec<f32>,
    num_voices: u32,
    debug: bool,
}

impl OnnxSession {
    /// Load every artifact named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error for non voice-embedding configurations, or if any
    /// artifact fails to load.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        if config.preprocessing != Preprocessing::VoiceEmbedding {
            return Err(PipelineError::EngineInit(format!(
                "unsupported preprocessing {:?}: only voice-embedding models are supported",
                config.preprocessing
            )));
        }
        let voices_path = config.voices.as_deref().ok_or_else(|| {
            PipelineError::EngineInit("voice-embedding model without a voices file".into())
        })?;

        info!(provider = %config.provider, "loading ONNX model {}", config.model.display());
        let threads = usize::try_from(config.num_threads).unwrap_or(1).max(1);
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(&config.model))
            .map_err(|e| PipelineError::EngineInit(format!("failed to load ONNX model: {e}")))?;

        let tokens = TokenTable::load(&config.tokens)?;
        let voice_styles = load_voice_styles(voices_path)?;
        let num_voices = (voice_styles.len() / (STYLE_ROWS * STYLE_DIM)) as u32;
        info!(tokens = tokens.len(), num_voices, "ONNX session ready");

        Ok(Self {
            session,
            tokens,
            phonemizer: Phonemizer::new(),
            voice_styles,
            num_voices,
            debug: config.debug,
        })
    }

    fn style_for(&self, voice_id: u32, content_len: usize) -> Result<&[f32]> {
        if voice_id >= self.num_voices {
            return Err(PipelineError::Tts(format!(
                "voice {voice_id} out of range (model has {})",
                self.num_voices
            )));
        }
        let row = content_len.clamp(1, STYLE_ROWS - 1);
        let offset = (voice_id as usize * STYLE_ROWS + row) * STYLE_DIM;
        Ok(&self.voice_styles[offset..offset + STYLE_DIM])
    }

    fn run_inference(
        &mut self,
        token_ids: Vec<i64>,
        style: Vec<f32>,
        speed: f32,
    ) -> Result<Vec<f32>> {
        let seq_len = token_ids.len();
        let tokens = Tensor::from_array(([1_usize, seq_len], token_ids))
            .map_err(|e| PipelineError::Tts(format!("failed to create tokens tensor: {e}")))?;
        let style = Tensor::from_array(([1_usize, STYLE_DIM], style))
            .map_err(|e| PipelineError::Tts(format!("failed to create style tensor: {e}")))?;
        let speed = Tensor::from_array(([1_usize], vec![speed]))
            .map_err(|e| PipelineError::Tts(format!("failed to create speed tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("tokens".to_string(), tokens.into());
        feed.insert("style".to_string(), style.into());
        feed.insert("speed".to_string(), speed.into());

        let outputs = self
            .session
            .run(SessionInputs::from(feed))
            .map_err(|e| PipelineError::Tts(format!("ONNX inference failed: {e}")))?;
        let (_shape, data) = outputs[0_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Tts(format!("failed to extract output tensor: {e}")))?;
        Ok(data.to_vec())
    }
}

impl EngineSession for OnnxSession {
    fn num_voices(&self) -> u32 {
        self.num_voices
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn generate(&mut self, text: &str, voice_id: u32, speed: f32) -> Result<GeneratedAudio> {
        if text.trim().is_empty() {
            return Ok(GeneratedAudio::new(Vec::new(), SAMPLE_RATE));
        }
        let start = std::time::Instant::now();

        let ipa = self.phonemizer.phonemize(text)?;
        let token_ids = self.tokens.encode(&ipa);
        if token_ids.len() > MAX_CONTEXT {
            return Err(PipelineError::Tts(format!(
                "input too long: {} tokens (max {MAX_CONTEXT})",
                token_ids.len()
            )));
        }
        if self.debug {
            debug!("phonemized \"{text}\" -> \"{ipa}\" ({} tokens)", token_ids.len());
        }

        let style = self.style_for(voice_id, token_ids.len() - 2)?.to_vec();
        let samples = self.run_inference(token_ids, style, speed.clamp(0.5, 2.0))?;

        debug!(
            samples = samples.len(),
            "generated {:.1}s of audio in {}ms",
            samples.len() as f32 / SAMPLE_RATE as f32,
            start.elapsed().as_millis()
        );
        Ok(GeneratedAudio::new(samples, SAMPLE_RATE))
    }
}

/// Read a little-endian f32 voice table of whole `(STYLE_ROWS, STYLE_DIM)` blocks.
fn load_voice_styles(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::EngineInit(format!("failed to read voices {}: {e}", path.display()))
    })?;
    parse_voice_styles(&bytes)
}

fn parse_voice_styles(bytes: &[u8]) -> Result<Vec<f32>> {
    let block = STYLE_ROWS * STYLE_DIM * 4;
    if bytes.is_empty() || bytes.len() % block != 0 {
        return Err(PipelineError::EngineInit(format!(
            "voices file has {} bytes, expected a non-zero multiple of {block}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
