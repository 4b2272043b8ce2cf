//! Per-language engine configuration builders.
//!
//! Artifact paths are resolved through the [`ModelRegistry`] first; every
//! missing name is collected so the caller sees the full list at once. The
//! resolved paths are then handed to the builder registered for the
//! language's preprocessing variant.

use super::engine::EngineConfig;
use crate::config::TtsConfig;
use crate::error::{PipelineError, Result};
use crate::language::{Language, ModelProfile, PHONEMIZER_DATA_DIR, Preprocessing};
use crate::models::ModelRegistry;
use std::path::PathBuf;

/// Absolute paths of every artifact a language needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArtifacts {
    pub model: PathBuf,
    pub tokens: PathBuf,
    pub voices: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
    pub dict_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Resolve every required artifact for `language`.
///
/// # Errors
///
/// Returns [`PipelineError::NotDownloaded`] if the language directory is
/// absent, or [`PipelineError::MissingFiles`] naming every absent artifact.
pub fn resolve_artifacts(
    registry: &ModelRegistry,
    language: Language,
) -> Result<ResolvedArtifacts> {
    if !registry.is_downloaded(language) {
        return Err(PipelineError::NotDownloaded(language));
    }
    let profile = language.profile();
    let mut missing = Vec::new();

    let mut require = |name: &'static str| {
        let path = registry.resolve_path(language, name);
        if path.is_none() {
            missing.push(name.to_owned());
        }
        path
    };
    let model = require(profile.model_file);
    let tokens = require(profile.tokens_file);
    let voices = profile.voices_file.and_then(&mut require);
    let lexicon = profile.lexicon_file.and_then(&mut require);
    let dict_dir = profile.dict_dir.and_then(&mut require);

    let data_dir = if profile.needs_phonemizer_data() {
        let dir = registry.phonemizer_data_dir(language);
        if dir.is_none() {
            missing.push(PHONEMIZER_DATA_DIR.to_owned());
        }
        dir
    } else {
        None
    };

    match (model, tokens) {
        (Some(model), Some(tokens)) if missing.is_empty() => Ok(ResolvedArtifacts {
            model,
            tokens,
            voices,
            lexicon,
            dict_dir,
            data_dir,
        }),
        _ => Err(PipelineError::MissingFiles {
            language,
            files: missing,
        }),
    }
}

type Builder = fn(&ModelProfile, ResolvedArtifacts, &TtsConfig) -> EngineConfig;

/// Builder lookup, one entry per preprocessing variant.
const BUILDERS: [(Preprocessing, Builder); 3] = [
    (Preprocessing::VoiceEmbedding, voice_embedding),
    (Preprocessing::LexiconDictionary, lexicon_dictionary),
    (Preprocessing::UniversalPhonemizer, universal_phonemizer),
];

fn base(
    profile: &ModelProfile,
    model: PathBuf,
    tokens: PathBuf,
    tts: &TtsConfig,
) -> EngineConfig {
    EngineConfig {
        model,
        tokens,
        voices: None,
        lexicon: None,
        dict_dir: None,
        data_dir: None,
        num_threads: tts.num_threads,
        noise_scale: profile.noise_scale,
        noise_scale_w: profile.noise_scale_w,
        length_scale: profile.length_scale,
        debug: tts.debug,
        provider: tts.provider.clone(),
        preprocessing: profile.preprocessing,
    }
}

/// Voice-embedding table, phonemizer data, no lexicon.
fn voice_embedding(
    profile: &ModelProfile,
    artifacts: ResolvedArtifacts,
    tts: &TtsConfig,
) -> EngineConfig {
    EngineConfig {
        voices: artifacts.voices,
        data_dir: artifacts.data_dir,
        ..base(profile, artifacts.model, artifacts.tokens, tts)
    }
}

/// Lexicon plus segmentation dictionary, no phonemizer data.
fn lexicon_dictionary(
    profile: &ModelProfile,
    artifacts: ResolvedArtifacts,
    tts: &TtsConfig,
) -> EngineConfig {
    EngineConfig {
        lexicon: artifacts.lexicon,
        dict_dir: artifacts.dict_dir,
        ..base(profile, artifacts.model, artifacts.tokens, tts)
    }
}

/// Token table plus phonemizer data only.
fn universal_phonemizer(
    profile: &ModelProfile,
    artifacts: ResolvedArtifacts,
    tts: &TtsConfig,
) -> EngineConfig {
    EngineConfig {
        data_dir: artifacts.data_dir,
        ..base(profile, artifacts.model, artifacts.tokens, tts)
    }
}

/// Build the engine configuration for `language` from resolved artifacts.
pub fn build_config(
    language: Language,
    artifacts: ResolvedArtifacts,
    tts: &TtsConfig,
) -> EngineConfig {
    let profile = language.profile();
    let builder = BUILDERS
        .iter()
        .find(|(variant, _)| *variant == profile.preprocessing)
        .map_or(universal_phonemizer as Builder, |(_, b)| *b);
    builder(profile, artifacts, tts)
}
