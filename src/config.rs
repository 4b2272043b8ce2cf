//! Configuration types for the model and audio pipeline.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model storage and download settings.
    pub models: ModelConfig,
    /// Inference engine settings shared by every language.
    pub tts: TtsConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
}

/// Model storage and download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Root directory holding one subdirectory per language.
    pub root_dir: PathBuf,
    /// Base URL the per-language archives are fetched from.
    pub base_url: String,
    /// Archive extension appended to the archive identifier.
    pub archive_extension: String,
    /// Shared phonemizer data directory (None = `<root_dir>/espeak-ng-data`).
    pub phonemizer_data_dir: Option<PathBuf>,
    /// TCP connect timeout for archive downloads.
    pub connect_timeout_secs: u64,
    /// Per-read timeout for archive downloads.
    pub read_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            root_dir: crate::app_dirs::models_dir(),
            base_url: "https://github.com/k2-fsa/sherpa-onnx/releases/download/tts-models"
                .to_owned(),
            archive_extension: "tar.bz2".to_owned(),
            phonemizer_data_dir: None,
            connect_timeout_secs: 15,
            read_timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    /// Resolved shared phonemizer data directory.
    pub fn shared_phonemizer_dir(&self) -> PathBuf {
        self.phonemizer_data_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join(crate::language::PHONEMIZER_DATA_DIR))
    }
}

/// Inference engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Threads handed to the engine per session.
    pub num_threads: u32,
    /// Compute provider identifier (`"cpu"`, `"coreml"`, `"cuda"`).
    pub provider: String,
    /// Ask the engine for verbose output.
    pub debug: bool,
    /// Default speech speed multiplier.
    pub speed: f32,
    /// Default voice / speaker index.
    pub voice_id: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            num_threads: 2,
            provider: "cpu".to_owned(),
            debug: false,
            speed: 1.0,
            voice_id: 0,
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.models.base_url.trim().is_empty() {
            return Err(PipelineError::Config("models.base_url is empty".into()));
        }
        if self.models.archive_extension.trim().is_empty() {
            return Err(PipelineError::Config(
                "models.archive_extension is empty".into(),
            ));
        }
        if self.tts.num_threads == 0 {
            return Err(PipelineError::Config("tts.num_threads must be > 0".into()));
        }
        if self.tts.speed.is_nan() || self.tts.speed <= 0.0 {
            return Err(PipelineError::Config(format!(
                "tts.speed must be positive, got {}",
                self.tts.speed
            )));
        }
        Ok(())
    }
}
