//! WAV export of synthesized audio.

use crate::error::{PipelineError, Result};
use crate::tts::engine::GeneratedAudio;
use std::path::Path;

/// Write `audio` as 16-bit mono PCM, clamping samples to [-1, 1].
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_wav(path: &Path, audio: &GeneratedAudio) -> Result<()> {
    let wav_format = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, wav_format)
        .map_err(|e| PipelineError::Audio(format!("failed to create {}: {e}", path.display())))?;

    for &s in &audio.samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| PipelineError::Audio(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::Audio(format!("failed to finalize wav: {e}")))?;
    Ok(())
}
