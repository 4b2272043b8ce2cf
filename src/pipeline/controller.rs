//! Pipeline controller: the operations the presentation layer invokes.
//!
//! Blocking work (download, extraction, session creation, generation) runs on
//! tokio's blocking pool. Everything the presentation layer reads is
//! published through watch channels: [`ControllerState`] for the status line,
//! current language and voice list, and the registry's per-language
//! [`StatusMap`].
//!
//! Each language switch bumps an epoch. Results of work started under an
//! older epoch are not published, and playback ownership moves to the new
//! language, so an in-flight synthesis for the previous language cannot write
//! into the rebuilt playback graph.

use super::synth::{SynthesisReport, synthesize};
use crate::audio::playback::{CpalBackend, OutputBackend, PlaybackOwner};
use crate::audio::worker::PlaybackHandle;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::language::Language;
use crate::models::fetch::{ArchiveFetcher, HttpFetcher};
use crate::models::{DownloadOutcome, ModelRegistry, StatusMap};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::tts::engine::{GeneratedAudio, SpeechEngine};
use crate::tts::kokoro::OnnxEngine;
use crate::tts::pool::{PooledSession, SessionPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Status line shown while no language is selected.
pub const STATUS_IDLE: &str = "Select a language";
/// Status line for a language whose model directory is absent.
pub const STATUS_NOT_DOWNLOADED: &str = "Model not downloaded";
/// Status line once a session is ready or a synthesis finished.
pub const STATUS_READY: &str = "Ready";

/// State published to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Free-text status line.
    pub status: String,
    /// Language selected by the last switch.
    pub current_language: Option<Language>,
    /// Voice indices of the current language's session.
    pub voices: Vec<u32>,
    /// A synthesis is in flight.
    pub synthesizing: bool,
    /// Report of the last finished synthesis.
    pub last_report: Option<SynthesisReport>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            status: STATUS_IDLE.to_owned(),
            current_language: None,
            voices: Vec::new(),
            synthesizing: false,
            last_report: None,
        }
    }
}

/// Owns the registry, the session pool and the playback thread.
pub struct Controller {
    config: PipelineConfig,
    registry: Arc<ModelRegistry>,
    pool: Arc<SessionPool>,
    playback: PlaybackHandle,
    state: watch::Sender<ControllerState>,
    epoch: Arc<AtomicU64>,
    progress: Option<Arc<ProgressCallback>>,
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Channel(format!("worker task failed: {e}"))
}

impl Controller {
    /// Build a controller from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the model root cannot
    /// be created, or the playback thread cannot be spawned.
    pub fn new(
        config: PipelineConfig,
        engine: Arc<dyn SpeechEngine>,
        fetcher: Arc<dyn ArchiveFetcher>,
        backend: Box<dyn OutputBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ModelRegistry::new(&config.models, fetcher)?);
        let pool = Arc::new(SessionPool::new(engine));
        let playback = PlaybackHandle::spawn(backend)?;
        let (state, _) = watch::channel(ControllerState::default());
        Ok(Self {
            config,
            registry,
            pool,
            playback,
            state,
            epoch: Arc::new(AtomicU64::new(0)),
            progress: None,
        })
    }

    /// Controller with the HTTP fetcher, the ONNX engine and the system
    /// audio device.
    ///
    /// # Errors
    ///
    /// See [`Controller::new`].
    pub fn with_defaults(config: PipelineConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.models));
        let backend = Box::new(CpalBackend::new(&config.audio));
        Self::new(config, Arc::new(OnnxEngine), fetcher, backend)
    }

    /// Deliver download and load progress to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    /// Current published state.
    pub fn state(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    /// Subscribe to published state.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Subscribe to per-language download status.
    pub fn subscribe_downloads(&self) -> watch::Receiver<StatusMap> {
        self.registry.subscribe()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.progress {
            cb(event);
        }
    }

    fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        info!("status: {status}");
        self.state.send_modify(|s| s.status = status);
    }

    /// Publish `update` only if no switch happened since `epoch`.
    fn publish_if_current(&self, epoch: u64, update: impl FnOnce(&mut ControllerState)) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        self.state.send_modify(update);
        true
    }

    /// Make `language` current and initialize its session.
    ///
    /// The playback graph is always rebuilt. A previously created session is
    /// reused. On success the voice list is published and the status becomes
    /// [`STATUS_READY`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotDownloaded`] (status
    /// [`STATUS_NOT_DOWNLOADED`]), a missing-files error, or an
    /// initialization error. No session is cached on failure.
    pub async fn switch_language(&self, language: Language) -> Result<Vec<u32>> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%language, epoch, "switching language");
        // A synthesis still running for the previous switch is orphaned.
        self.state.send_modify(|s| {
            s.current_language = Some(language);
            s.voices.clear();
            s.synthesizing = false;
        });
        self.playback.reset(PlaybackOwner::new(language, epoch))?;

        if !self.registry.is_downloaded(language) {
            self.publish_if_current(epoch, |s| s.status = STATUS_NOT_DOWNLOADED.to_owned());
            return Err(PipelineError::NotDownloaded(language));
        }

        let needs_init = self.pool.get(language).is_none();
        if needs_init {
            self.set_status(format!("Loading {}…", language.profile().display_name));
            self.emit(ProgressEvent::LoadStarted { language });
        }

        let start = Instant::now();
        let pool = Arc::clone(&self.pool);
        let registry = Arc::clone(&self.registry);
        let tts = self.config.tts.clone();
        let result = tokio::task::spawn_blocking(move || {
            pool.get_or_create(language, &registry, &tts)
        })
        .await
        .map_err(join_error)?;

        match result {
            Ok(session) => {
                let voices = session.voice_ids();
                if needs_init {
                    self.emit(ProgressEvent::LoadComplete {
                        language,
                        duration_secs: start.elapsed().as_secs_f64(),
                    });
                }
                let published = self.publish_if_current(epoch, |s| {
                    s.voices = voices.clone();
                    s.status = STATUS_READY.to_owned();
                });
                if !published {
                    info!(%language, "language switched again before initialization finished");
                }
                Ok(voices)
            }
            Err(e) => {
                warn!(%language, "language switch failed: {e}");
                self.emit(ProgressEvent::Error {
                    language,
                    message: e.to_string(),
                });
                self.publish_if_current(epoch, |s| s.status = e.to_string());
                Err(e)
            }
        }
    }

    fn current_session(&self) -> Result<(Language, Arc<PooledSession>, u64)> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let language = self
            .state
            .borrow()
            .current_language
            .ok_or_else(|| PipelineError::Tts("no language selected".into()))?;
        let session = self.pool.get(language).ok_or_else(|| {
            if self.registry.is_downloaded(language) {
                PipelineError::Tts(format!("{language} model is not loaded"))
            } else {
                PipelineError::NotDownloaded(language)
            }
        })?;
        Ok((language, session, epoch))
    }

    /// Speak `text` with the current language, sentence by sentence.
    ///
    /// Sentences that fail to generate are skipped. When the batch finishes
    /// the status returns to [`STATUS_READY`] with the report summary.
    ///
    /// # Errors
    ///
    /// Returns an error if no language is selected or its session is not
    /// loaded. Per-sentence and playback failures are reported in the
    /// returned [`SynthesisReport`].
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: u32,
        speed: f32,
    ) -> Result<SynthesisReport> {
        let (language, session, epoch) = match self.current_session() {
            Ok(current) => current,
            Err(e) => {
                self.set_status(e.to_string());
                return Err(e);
            }
        };
        self.state.send_modify(|s| {
            s.synthesizing = true;
            s.status = "Synthesizing…".to_owned();
        });

        let owner = PlaybackOwner::new(language, epoch);
        let playback = self.playback.clone();
        let text = text.to_owned();
        let joined = tokio::task::spawn_blocking(move || {
            synthesize(&session, &text, voice_id, speed, |audio| {
                if playback.play(owner, audio)? {
                    Ok(())
                } else {
                    Err(PipelineError::Audio(format!(
                        "playback moved away from {language}"
                    )))
                }
            })
        })
        .await;

        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                let status = format!("Synthesis failed: {e}");
                self.publish_if_current(epoch, |s| {
                    s.synthesizing = false;
                    s.status = status;
                });
                return Err(join_error(e));
            }
        };

        let status = match &report.aborted {
            Some(reason) => format!("Playback error: {reason}"),
            None => format!("{STATUS_READY} ({})", report.summary()),
        };
        let published = self.publish_if_current(epoch, |s| {
            s.synthesizing = false;
            s.status = status;
            s.last_report = Some(report.clone());
        });
        if !published {
            info!(%language, "synthesis finished after a language switch, not published");
        }
        Ok(report)
    }

    /// Synthesize `text` with the current language into one buffer instead
    /// of playing it.
    ///
    /// # Errors
    ///
    /// Returns an error if no session is loaded or no sentence produced audio.
    pub async fn render(
        &self,
        text: &str,
        voice_id: u32,
        speed: f32,
    ) -> Result<(GeneratedAudio, SynthesisReport)> {
        let (_, session, _) = self.current_session()?;
        let sample_rate = session.sample_rate();
        let text = text.to_owned();
        let (samples, report) = tokio::task::spawn_blocking(move || {
            let mut samples = Vec::new();
            let report = synthesize(&session, &text, voice_id, speed, |audio| {
                samples.extend_from_slice(&audio.samples);
                Ok(())
            });
            (samples, report)
        })
        .await
        .map_err(join_error)?;

        if report.played == 0 {
            return Err(PipelineError::Tts("no sentence produced audio".into()));
        }
        Ok((GeneratedAudio::new(samples, sample_rate), report))
    }

    /// Fetch and extract `language`'s model.
    ///
    /// A second call while the first is in flight returns
    /// [`DownloadOutcome::AlreadyInProgress`] without fetching again.
    ///
    /// # Errors
    ///
    /// Returns the fetch or extraction error; the language stays
    /// not-downloaded and may be retried.
    pub async fn download_model(&self, language: Language) -> Result<DownloadOutcome> {
        let name = language.profile().display_name;
        self.set_status(format!("Downloading {name}…"));

        let registry = Arc::clone(&self.registry);
        let progress = self.progress.clone();
        let result = tokio::task::spawn_blocking(move || {
            registry.download(language, progress.as_deref())
        })
        .await
        .map_err(join_error)?;

        match &result {
            Ok(DownloadOutcome::Completed) => self.set_status(format!("{name} model downloaded")),
            Ok(DownloadOutcome::AlreadyInProgress) => {
                self.set_status(format!("{name} download already in progress"));
            }
            Err(e) => self.set_status(format!("Download failed: {e}")),
        }
        result
    }

    /// Delete `language`'s model directory. Idempotent.
    ///
    /// A session already created for the language stays usable until
    /// shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error while a download is in flight or if removal fails.
    pub async fn delete_model(&self, language: Language) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || registry.delete(language))
            .await
            .map_err(join_error)?;
        match &result {
            Ok(()) => self.set_status(format!("{} model deleted", language.profile().display_name)),
            Err(e) => self.set_status(format!("Delete failed: {e}")),
        }
        result
    }

    /// Destroy every session and stop the playback thread.
    pub fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let released = self.pool.shutdown();
        self.playback.shutdown();
        info!(released, "controller shut down");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.playback.shutdown();
    }
}
