//! Model registry: on-disk presence, download status and path resolution.
//!
//! One [`ModelRegistry`] owns the per-language [`DownloadStatus`] map and the
//! filesystem subtree under `models.root_dir`. The status map lives in a
//! `tokio::sync::watch` channel: mutations go through the sender (serialized),
//! and observers subscribe for a stream of snapshots.

pub mod extract;
pub mod fetch;

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::language::{Language, PHONEMIZER_DATA_DIR};
use crate::progress::{DownloadStatus, ProgressCallback, ProgressEvent, fraction};
use fetch::ArchiveFetcher;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{info, warn};

/// Snapshot of every language's download status.
pub type StatusMap = BTreeMap<Language, DownloadStatus>;

/// Result of a [`ModelRegistry::download`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The archive was fetched and extracted.
    Completed,
    /// Another download for the same language was already in flight; nothing was done.
    AlreadyInProgress,
}

/// Filesystem operation currently owning a language directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Download,
    Delete,
}

/// Releases a language's [`Claim`] when dropped.
struct ClaimGuard<'a> {
    claims: &'a Mutex<ClaimMap>,
    language: Language,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        lock_claims(self.claims).remove(&self.language);
    }
}

type ClaimMap = BTreeMap<Language, Claim>;

fn lock_claims(claims: &Mutex<ClaimMap>) -> MutexGuard<'_, ClaimMap> {
    claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks per-language model presence and drives archive downloads.
pub struct ModelRegistry {
    root: PathBuf,
    base_url: String,
    archive_extension: String,
    shared_phonemizer_dir: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
    status: watch::Sender<StatusMap>,
    claims: Mutex<ClaimMap>,
}

impl ModelRegistry {
    /// Create a registry rooted at `config.root_dir`.
    ///
    /// Initial statuses are derived from what is already on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(config: &ModelConfig, fetcher: Arc<dyn ArchiveFetcher>) -> Result<Self> {
        std::fs::create_dir_all(&config.root_dir)?;
        info!("model root directory: {}", config.root_dir.display());

        let initial: StatusMap = Language::ALL
            .into_iter()
            .map(|lang| {
                let dir = config.root_dir.join(lang.id());
                let status = if dir.is_dir() {
                    DownloadStatus::Downloaded
                } else {
                    DownloadStatus::NotDownloaded
                };
                (lang, status)
            })
            .collect();
        let (status, _) = watch::channel(initial);

        Ok(Self {
            root: config.root_dir.clone(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            archive_extension: config.archive_extension.clone(),
            shared_phonemizer_dir: config.shared_phonemizer_dir(),
            fetcher,
            status,
            claims: Mutex::new(BTreeMap::new()),
        })
    }

    /// Root directory holding the per-language subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a language's archive is extracted into.
    pub fn language_dir(&self, language: Language) -> PathBuf {
        self.root.join(language.id())
    }

    /// `true` iff the language directory exists and is a directory.
    ///
    /// This is an existence check only; artifact completeness is verified
    /// when a session is created.
    pub fn is_downloaded(&self, language: Language) -> bool {
        self.language_dir(language).is_dir()
    }

    /// Resolve `file_name` under the language directory, if it exists.
    pub fn resolve_path(&self, language: Language, file_name: &str) -> Option<PathBuf> {
        let path = self.language_dir(language).join(file_name);
        path.exists().then_some(path)
    }

    /// Universal phonemizer data directory for `language`.
    ///
    /// Prefers the process-wide shared directory and falls back to the copy
    /// shipped inside the language's own archive.
    pub fn phonemizer_data_dir(&self, language: Language) -> Option<PathBuf> {
        if self.shared_phonemizer_dir.is_dir() {
            return Some(self.shared_phonemizer_dir.clone());
        }
        self.resolve_path(language, PHONEMIZER_DATA_DIR)
            .filter(|p| p.is_dir())
    }

    /// Fully-formed archive URL for `language`.
    pub fn archive_url(&self, language: Language) -> String {
        format!(
            "{}/{}",
            self.base_url,
            language.profile().archive_file_name(&self.archive_extension)
        )
    }

    /// Current status of one language.
    pub fn status(&self, language: Language) -> DownloadStatus {
        self.status
            .borrow()
            .get(&language)
            .cloned()
            .unwrap_or(DownloadStatus::NotDownloaded)
    }

    /// Subscribe to status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.status.subscribe()
    }

    /// Re-derive a language's status from disk, unless a download is in flight.
    pub fn refresh(&self, language: Language) {
        let on_disk = self.is_downloaded(language);
        self.status.send_if_modified(|map| {
            let entry = map.entry(language).or_insert(DownloadStatus::NotDownloaded);
            if entry.is_downloading() {
                return false;
            }
            let next = if on_disk {
                DownloadStatus::Downloaded
            } else {
                match entry {
                    // Keep the failure reason visible until the next attempt.
                    DownloadStatus::Failed(_) => return false,
                    _ => DownloadStatus::NotDownloaded,
                }
            };
            if *entry == next {
                return false;
            }
            *entry = next;
            true
        });
    }

    fn set_status(&self, language: Language, status: DownloadStatus) {
        self.status.send_modify(|map| {
            map.insert(language, status);
        });
    }

    /// Take exclusive ownership of `language`'s directory for `kind`.
    ///
    /// Returns the claim already held if another operation owns it. A
    /// download claim moves the status to `Downloading(0.0)` under the same
    /// lock, so observers never see a claimed language as idle.
    fn claim(
        &self,
        language: Language,
        kind: Claim,
    ) -> std::result::Result<ClaimGuard<'_>, Claim> {
        let mut claims = lock_claims(&self.claims);
        if let Some(held) = claims.get(&language) {
            return Err(*held);
        }
        claims.insert(language, kind);
        if kind == Claim::Download {
            self.set_status(language, DownloadStatus::Downloading(0.0));
        }
        Ok(ClaimGuard {
            claims: &self.claims,
            language,
        })
    }

    /// Fetch and extract the archive for `language`.
    ///
    /// Blocks; run it on a worker context. At most one download per language
    /// is in flight: a second call while the first is running returns
    /// [`DownloadOutcome::AlreadyInProgress`] without touching the network.
    ///
    /// # Errors
    ///
    /// Returns the fetch or extraction error. The status becomes
    /// [`DownloadStatus::Failed`] and the language directory is absent.
    /// Also fails without fetching while the language is being deleted.
    pub fn download(
        &self,
        language: Language,
        callback: Option<&ProgressCallback>,
    ) -> Result<DownloadOutcome> {
        let _claim = match self.claim(language, Claim::Download) {
            Ok(guard) => guard,
            Err(Claim::Download) => {
                info!(%language, "download already in progress, ignoring request");
                return Ok(DownloadOutcome::AlreadyInProgress);
            }
            Err(Claim::Delete) => {
                return Err(PipelineError::Download(format!(
                    "cannot download {language} while it is being deleted"
                )));
            }
        };

        match self.run_download(language, callback) {
            Ok(()) => {
                self.set_status(language, DownloadStatus::Downloaded);
                info!(%language, "model downloaded");
                Ok(DownloadOutcome::Completed)
            }
            Err(e) => {
                warn!(%language, "model download failed: {e}");
                self.set_status(language, DownloadStatus::Failed(e.to_string()));
                if let Some(cb) = callback {
                    cb(ProgressEvent::Error {
                        language,
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    fn run_download(&self, language: Language, callback: Option<&ProgressCallback>) -> Result<()> {
        let url = self.archive_url(language);
        let archive = self
            .root
            .join(format!(".{}.{}.part", language.id(), self.archive_extension));

        if let Some(cb) = callback {
            cb(ProgressEvent::DownloadStarted {
                language,
                url: url.clone(),
            });
        }

        // Publish whole-percent steps only, so observers are not flooded.
        let last_percent = std::sync::atomic::AtomicU32::new(0);
        let on_progress = |received: u64, total: Option<u64>| {
            let frac = fraction(received, total);
            let percent = (frac * 100.0) as u32;
            if percent > last_percent.swap(percent, std::sync::atomic::Ordering::Relaxed) {
                self.set_status(language, DownloadStatus::Downloading(frac));
            }
            if let Some(cb) = callback {
                cb(ProgressEvent::DownloadProgress {
                    language,
                    bytes_downloaded: received,
                    total_bytes: total,
                });
            }
        };

        let result = self
            .fetcher
            .fetch(&url, &archive, &on_progress)
            .and_then(|bytes| {
                if let Some(cb) = callback {
                    cb(ProgressEvent::DownloadComplete { language, bytes });
                    cb(ProgressEvent::ExtractStarted { language });
                }
                extract::extract(&archive, &self.language_dir(language))
            });

        if archive.exists()
            && let Err(e) = std::fs::remove_file(&archive)
        {
            warn!("failed to remove temporary archive {}: {e}", archive.display());
        }

        result?;
        if let Some(cb) = callback {
            cb(ProgressEvent::ExtractComplete { language });
        }
        Ok(())
    }

    /// Remove a language's model directory and reset its status.
    ///
    /// Idempotent: deleting an absent model is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a download or another delete for the language is
    /// in flight, or the directory cannot be removed.
    pub fn delete(&self, language: Language) -> Result<()> {
        let _claim = self.claim(language, Claim::Delete).map_err(|held| {
            PipelineError::Download(match held {
                Claim::Download => {
                    format!("cannot delete {language} while it is downloading")
                }
                Claim::Delete => format!("{language} is already being deleted"),
            })
        })?;
        let dir = self.language_dir(language);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            info!(%language, "deleted model directory {}", dir.display());
        }
        self.set_status(language, DownloadStatus::NotDownloaded);
        Ok(())
    }
}
