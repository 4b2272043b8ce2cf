//! Inference session pool: one lazily-created session per language.
//!
//! Session creation is expensive, so a language's session is created at most
//! once per pool lifetime. Initialization is serialized per language by an
//! init guard; other languages initialize independently. Failed creations
//! are not cached, so the next request retries.

use super::builder::{build_config, resolve_artifacts};
use super::engine::{EngineSession, GeneratedAudio, SpeechEngine};
use crate::config::TtsConfig;
use crate::error::{PipelineError, Result};
use crate::language::Language;
use crate::models::ModelRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A created session plus the metadata queried at creation.
pub struct PooledSession {
    language: Language,
    num_voices: u32,
    sample_rate: u32,
    inner: Mutex<Box<dyn EngineSession>>,
}

impl PooledSession {
    pub fn new(language: Language, session: Box<dyn EngineSession>) -> Self {
        Self {
            language,
            num_voices: session.num_voices(),
            sample_rate: session.sample_rate(),
            inner: Mutex::new(session),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Voice / speaker count reported by the engine.
    pub fn num_voices(&self) -> u32 {
        self.num_voices
    }

    /// Native output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Voice indices `0..num_voices`, as published to the presentation layer.
    pub fn voice_ids(&self) -> Vec<u32> {
        (0..self.num_voices).collect()
    }

    /// Run one generation. Calls on the same session are serialized.
    ///
    /// # Errors
    ///
    /// Propagates the engine's generation error.
    pub fn generate(&self, text: &str, voice_id: u32, speed: f32) -> Result<GeneratedAudio> {
        lock(&self.inner).generate(text, voice_id, speed)
    }
}

/// Owns every session the pool created.
pub struct SessionPool {
    engine: Arc<dyn SpeechEngine>,
    sessions: Mutex<HashMap<Language, Arc<PooledSession>>>,
    init_guards: Mutex<HashMap<Language, Arc<Mutex<()>>>>,
}

impl SessionPool {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
            init_guards: Mutex::new(HashMap::new()),
        }
    }

    /// Existing session for `language`, if one was created.
    pub fn get(&self, language: Language) -> Option<Arc<PooledSession>> {
        lock(&self.sessions).get(&language).cloned()
    }

    /// Languages that currently hold a session.
    pub fn loaded(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = lock(&self.sessions).keys().copied().collect();
        langs.sort();
        langs
    }

    fn init_guard(&self, language: Language) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.init_guards).entry(language).or_default())
    }

    /// Return the session for `language`, creating it on first use.
    ///
    /// Blocks during creation; run it on a worker context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotDownloaded`] or
    /// [`PipelineError::MissingFiles`] before touching the engine, and
    /// [`PipelineError::EngineInit`] if the engine rejects the configuration.
    pub fn get_or_create(
        &self,
        language: Language,
        registry: &ModelRegistry,
        tts: &TtsConfig,
    ) -> Result<Arc<PooledSession>> {
        if let Some(existing) = self.get(language) {
            return Ok(existing);
        }

        let guard = self.init_guard(language);
        let _init = lock(guard.as_ref());

        // Another caller may have finished while we waited for the guard.
        if let Some(existing) = self.get(language) {
            return Ok(existing);
        }

        let artifacts = resolve_artifacts(registry, language)?;
        let config = build_config(language, artifacts, tts);

        info!(%language, model = %config.model.display(), "creating inference session");
        let start = Instant::now();
        let session = self.engine.create(&config).map_err(|e| {
            warn!(%language, "session creation failed: {e}");
            PipelineError::EngineInit(format!("{language}: {e}"))
        })?;

        let pooled = Arc::new(PooledSession::new(language, session));
        info!(
            %language,
            voices = pooled.num_voices(),
            sample_rate = pooled.sample_rate(),
            "session ready in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        lock(&self.sessions).insert(language, Arc::clone(&pooled));
        Ok(pooled)
    }

    /// Destroy every session. Returns how many were released.
    ///
    /// A session still borrowed by an in-flight synthesis is destroyed when
    /// that synthesis drops its handle.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = lock(&self.sessions).drain().collect();
        for (language, session) in &drained {
            if Arc::strong_count(session) > 1 {
                warn!(%language, "session still in use at shutdown");
            }
        }
        let count = drained.len();
        drop(drained);
        lock(&self.init_guards).clear();
        info!(count, "session pool shut down");
        count
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        let remaining = lock(&self.sessions).len();
        if remaining > 0 {
            self.shutdown();
        }
    }
}
