//! Audio output: the playback graph, its worker thread and WAV export.

pub mod playback;
pub mod wav;
pub mod worker;

pub use playback::{
    AudioStreamer, CpalBackend, OutputBackend, OutputStream, PlaybackOwner, SampleQueue,
};
pub use worker::{PlaybackHandle, PlaybackState};
