//! voxpipe: per-language TTS model acquisition and gapless audio streaming.
//!
//! The crate downloads one compressed model archive per language, unpacks it
//! into a stable on-disk layout, creates one inference session per language
//! on demand, and streams synthesized speech sentence by sentence to the
//! audio device:
//!
//! Archive Fetcher → Archive Extractor → Model Registry → Session Pool →
//! Synthesis Pipeline → Audio Streamer
//!
//! # Architecture
//!
//! - **Models** ([`models`]): `ureq` download, `bzip2` + `tar` extraction,
//!   per-language status published on a `tokio::sync::watch` channel
//! - **TTS** ([`tts`]): engine seam, per-variant configuration builders,
//!   lazily-initialized session pool, bundled ONNX Runtime backend
//! - **Pipeline** ([`pipeline`]): sentence splitting, ordered synthesis and
//!   the [`Controller`] the presentation layer drives
//! - **Audio** ([`audio`]): `cpal` playback graph on a dedicated thread

pub mod app_dirs;
pub mod audio;
pub mod config;
pub mod error;
pub mod language;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod tts;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use language::Language;
pub use pipeline::controller::{Controller, ControllerState};
pub use progress::{DownloadStatus, ProgressCallback, ProgressEvent};
