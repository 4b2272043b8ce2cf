//! Supported languages and their static model catalogue.
//!
//! Each [`Language`] maps to one [`ModelProfile`]: the archive it is fetched
//! from, the artifacts that must exist after extraction, and the numeric
//! parameters the inference engine is configured with. The table is fixed at
//! compile time.

use crate::error::PipelineError;
use std::fmt;
use std::str::FromStr;

/// Directory name of the universal phonemizer data shipped with most archives.
pub const PHONEMIZER_DATA_DIR: &str = "espeak-ng-data";

/// A supported locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    /// English (Kokoro, multi-voice).
    English,
    /// French (Piper VITS).
    French,
    /// Arabic (Piper VITS).
    Arabic,
    /// Mandarin Chinese (VITS with lexicon and jieba dictionary).
    Chinese,
    /// Spanish (Piper VITS).
    Spanish,
}

/// Text preprocessing pipeline a model expects from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preprocessing {
    /// Voice-embedding table, no phoneme lexicon.
    VoiceEmbedding,
    /// Phoneme lexicon plus word-segmentation dictionary, no phonemizer data.
    LexiconDictionary,
    /// Token table plus the universal phonemizer data directory.
    UniversalPhonemizer,
}

/// Static description of one language's model.
#[derive(Debug, Clone, Copy)]
pub struct ModelProfile {
    /// Human-readable name shown in pickers.
    pub display_name: &'static str,
    /// Flag emoji.
    pub flag: &'static str,
    /// Remote archive identifier (archive file stem).
    pub archive_id: &'static str,
    /// Rough download size, for display only.
    pub size_estimate: &'static str,
    /// Acoustic model file name.
    pub model_file: &'static str,
    /// Token map file name.
    pub tokens_file: &'static str,
    /// Voice-embedding table, when the model has one.
    pub voices_file: Option<&'static str>,
    /// Phoneme lexicon, when the model has one.
    pub lexicon_file: Option<&'static str>,
    /// Word-segmentation dictionary directory, when the model has one.
    pub dict_dir: Option<&'static str>,
    /// Which preprocessing pipeline the engine must select.
    pub preprocessing: Preprocessing,
    /// VITS noise scale.
    pub noise_scale: f32,
    /// VITS duration-predictor noise scale.
    pub noise_scale_w: f32,
    /// Length scale (> 1.0 slows speech down).
    pub length_scale: f32,
}

impl ModelProfile {
    /// Every file or directory name that must resolve under the language
    /// directory before a session can be created.
    ///
    /// The shared phonemizer data directory is not listed here; it is
    /// resolved separately because it may live outside the language directory.
    pub fn required_files(&self) -> Vec<&'static str> {
        let mut files = vec![self.model_file, self.tokens_file];
        files.extend(self.voices_file);
        files.extend(self.lexicon_file);
        files.extend(self.dict_dir);
        files
    }

    /// Whether the engine needs the universal phonemizer data directory.
    pub fn needs_phonemizer_data(&self) -> bool {
        !matches!(self.preprocessing, Preprocessing::LexiconDictionary)
    }

    /// Archive file name for the given extension (e.g. `tar.bz2`).
    pub fn archive_file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.archive_id)
    }
}

const ENGLISH: ModelProfile = ModelProfile {
    display_name: "English",
    flag: "🇺🇸",
    archive_id: "kokoro-en-v0_19",
    size_estimate: "~305 MB",
    model_file: "model.onnx",
    tokens_file: "tokens.txt",
    voices_file: Some("voices.bin"),
    lexicon_file: None,
    dict_dir: None,
    preprocessing: Preprocessing::VoiceEmbedding,
    noise_scale: 0.667,
    noise_scale_w: 0.8,
    length_scale: 1.0,
};

const FRENCH: ModelProfile = ModelProfile {
    display_name: "Français",
    flag: "🇫🇷",
    archive_id: "vits-piper-fr_FR-siwis-medium",
    size_estimate: "~64 MB",
    model_file: "fr_FR-siwis-medium.onnx",
    tokens_file: "tokens.txt",
    voices_file: None,
    lexicon_file: None,
    dict_dir: None,
    preprocessing: Preprocessing::UniversalPhonemizer,
    noise_scale: 0.667,
    noise_scale_w: 0.8,
    length_scale: 1.0,
};

const ARABIC: ModelProfile = ModelProfile {
    display_name: "العربية",
    flag: "🇯🇴",
    archive_id: "vits-piper-ar_JO-kareem-medium",
    size_estimate: "~64 MB",
    model_file: "ar_JO-kareem-medium.onnx",
    tokens_file: "tokens.txt",
    voices_file: None,
    lexicon_file: None,
    dict_dir: None,
    preprocessing: Preprocessing::UniversalPhonemizer,
    noise_scale: 0.667,
    noise_scale_w: 0.8,
    length_scale: 1.0,
};

const CHINESE: ModelProfile = ModelProfile {
    display_name: "中文",
    flag: "🇨🇳",
    archive_id: "vits-zh-hf-fanchen-C",
    size_estimate: "~116 MB",
    model_file: "vits-zh-hf-fanchen-C.onnx",
    tokens_file: "tokens.txt",
    voices_file: None,
    lexicon_file: Some("lexicon.txt"),
    dict_dir: Some("dict"),
    preprocessing: Preprocessing::LexiconDictionary,
    noise_scale: 0.667,
    noise_scale_w: 0.8,
    length_scale: 1.0,
};

const SPANISH: ModelProfile = ModelProfile {
    display_name: "Español",
    flag: "🇪🇸",
    archive_id: "vits-piper-es_ES-davefx-medium",
    size_estimate: "~64 MB",
    model_file: "es_ES-davefx-medium.onnx",
    tokens_file: "tokens.txt",
    voices_file: None,
    lexicon_file: None,
    dict_dir: None,
    preprocessing: Preprocessing::UniversalPhonemizer,
    noise_scale: 0.667,
    noise_scale_w: 0.8,
    length_scale: 1.0,
};

impl Language {
    /// All supported languages, in picker order.
    pub const ALL: [Language; 5] = [
        Language::English,
        Language::French,
        Language::Arabic,
        Language::Chinese,
        Language::Spanish,
    ];

    /// Lowercased identifier, also used as the on-disk directory name.
    pub fn id(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::Arabic => "arabic",
            Language::Chinese => "chinese",
            Language::Spanish => "spanish",
        }
    }

    /// Static model description for this language.
    pub fn profile(self) -> &'static ModelProfile {
        match self {
            Language::English => &ENGLISH,
            Language::French => &FRENCH,
            Language::Arabic => &ARABIC,
            Language::Chinese => &CHINESE,
            Language::Spanish => &SPANISH,
        }
    }

    /// Parse a lowercased identifier (case-insensitive).
    pub fn from_id(id: &str) -> Option<Language> {
        let id = id.trim();
        Self::ALL
            .into_iter()
            .find(|lang| lang.id().eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_id(s).ok_or_else(|| {
            let known: Vec<&str> = Language::ALL.iter().map(|l| l.id()).collect();
            PipelineError::Config(format!(
                "unknown language '{s}' (expected one of: {})",
                known.join(", ")
            ))
        })
    }
}
