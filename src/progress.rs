//! Download status and progress event types.
//!
//! Provides callback-based progress reporting that decouples the model
//! acquisition logic from presentation (CLI indicatif bars vs app state).

use crate::language::Language;
use std::fmt;

/// Per-language download state owned by the model registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    /// No model directory on disk.
    NotDownloaded,
    /// Archive fetch or extraction in flight, with progress in `[0, 1]`.
    Downloading(f32),
    /// Model directory present.
    Downloaded,
    /// Last attempt failed; retry is a fresh download.
    Failed(String),
}

impl DownloadStatus {
    /// Returns `true` while a download is in flight.
    pub fn is_downloading(&self) -> bool {
        matches!(self, Self::Downloading(_))
    }

    /// Returns `true` if the model is present on disk.
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded)
    }

    /// Progress fraction for display; `1.0` once downloaded.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Downloading(p) => *p,
            Self::Downloaded => 1.0,
            Self::NotDownloaded | Self::Failed(_) => 0.0,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDownloaded => write!(f, "not downloaded"),
            Self::Downloading(p) => write!(f, "downloading ({:.0}%)", p * 100.0),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Map received bytes onto `[0, 1]`.
///
/// Unknown or zero totals report `0.0` until the transfer completes.
pub fn fraction(bytes_received: u64, total_bytes: Option<u64>) -> f32 {
    match total_bytes {
        Some(total) if total > 0 => (bytes_received as f64 / total as f64).clamp(0.0, 1.0) as f32,
        _ => 0.0,
    }
}

/// Progress events emitted during model acquisition and session loading.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The archive fetch has started.
    DownloadStarted {
        /// Language being downloaded.
        language: Language,
        /// Archive URL.
        url: String,
    },

    /// Download progress update.
    DownloadProgress {
        /// Language being downloaded.
        language: Language,
        /// Bytes received so far.
        bytes_downloaded: u64,
        /// Total size in bytes, if the server reported it.
        total_bytes: Option<u64>,
    },

    /// The archive is fully on disk.
    DownloadComplete {
        /// Language being downloaded.
        language: Language,
        /// Archive size in bytes.
        bytes: u64,
    },

    /// Decompression and unpacking started.
    ExtractStarted {
        /// Language being extracted.
        language: Language,
    },

    /// Extraction finished and the directory layout was normalized.
    ExtractComplete {
        /// Language that was extracted.
        language: Language,
    },

    /// Inference session creation started.
    LoadStarted {
        /// Language being loaded.
        language: Language,
    },

    /// Inference session created.
    LoadComplete {
        /// Language that was loaded.
        language: Language,
        /// Time taken to load in seconds.
        duration_secs: f64,
    },

    /// An error occurred during download, extraction or loading.
    Error {
        /// Language the failure belongs to.
        language: Language,
        /// Human-readable error description.
        message: String,
    },
}

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;
