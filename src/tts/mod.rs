//! Text-to-speech sessions.
//!
//! [`engine`] is the seam to the inference engine, [`builder`] turns a
//! language's on-disk artifacts into an engine configuration, and [`pool`]
//! owns one lazily-created session per language. [`kokoro`] is the bundled
//! ONNX Runtime backend.

pub mod builder;
pub mod engine;
pub mod kokoro;
pub mod pool;

pub use engine::{EngineConfig, EngineSession, GeneratedAudio, SpeechEngine};
pub use kokoro::OnnxEngine;
pub use pool::{PooledSession, SessionPool};
