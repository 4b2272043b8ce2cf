//! Reference ONNX backend for voice-embedding models, with misaki G2P.

mod engine;
mod phonemize;

pub use engine::{OnnxEngine, OnnxSession};
pub use phonemize::{Phonemizer, TokenTable, normalize_text};
