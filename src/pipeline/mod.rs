//! Synthesis pipeline: sentence splitting, ordered per-sentence generation,
//! and the controller that coordinates downloads, sessions and playback.

pub mod controller;
pub mod sentences;
pub mod synth;

pub use controller::{Controller, ControllerState};
pub use sentences::split_sentences;
pub use synth::{SynthesisReport, synthesize};
