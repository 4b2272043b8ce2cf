//! Shared test doubles: fetcher, engine, session and output backend fakes,
//! plus on-disk model fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::audio::playback::{OutputBackend, OutputStream, SampleQueue};
use crate::error::{PipelineError, Result};
use crate::language::{Language, PHONEMIZER_DATA_DIR};
use crate::models::fetch::{ArchiveFetcher, FetchProgress};
use crate::tts::engine::{EngineConfig, EngineSession, GeneratedAudio, SpeechEngine};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A `.tar.bz2` laid out like the English archive, nested one level deep.
pub fn english_archive() -> Vec<u8> {
    let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    let entries: [(&str, &[u8]); 4] = [
        ("kokoro-en-v0_19/model.onnx", b"onnx"),
        ("kokoro-en-v0_19/tokens.txt", b"a 1\nb 2\n"),
        ("kokoro-en-v0_19/voices.bin", &[0u8; 16]),
        ("kokoro-en-v0_19/espeak-ng-data/phontab", b"p"),
    ];
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).expect("append entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish bzip2")
}

/// Create every artifact `language` needs directly under `root`.
pub fn populate_language(root: &Path, language: Language) {
    let profile = language.profile();
    let dir = root.join(language.id());
    std::fs::create_dir_all(&dir).expect("create language dir");
    for name in profile.required_files() {
        if Some(name) == profile.dict_dir {
            std::fs::create_dir_all(dir.join(name)).expect("create dict dir");
        } else {
            std::fs::write(dir.join(name), b"fixture").expect("write artifact");
        }
    }
    if profile.needs_phonemizer_data() {
        std::fs::create_dir_all(dir.join(PHONEMIZER_DATA_DIR)).expect("create phonemizer dir");
    }
}

/// Fetcher that serves a fixed payload, optionally failing or waiting for a gate.
pub struct StaticFetcher {
    payload: Vec<u8>,
    failure: Option<String>,
    gate: Option<crossbeam_channel::Receiver<()>>,
    pub calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            failure: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_owned()),
            ..Self::new(Vec::new())
        }
    }

    /// Fetcher that blocks inside `fetch` until the returned sender fires.
    pub fn gated(payload: Vec<u8>) -> (Self, crossbeam_channel::Sender<()>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let fetcher = Self {
            gate: Some(rx),
            ..Self::new(payload)
        };
        (fetcher, tx)
    }
}

impl ArchiveFetcher for StaticFetcher {
    fn fetch(&self, _url: &str, dest: &Path, on_progress: FetchProgress<'_>) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        if let Some(message) = &self.failure {
            return Err(PipelineError::Download(message.clone()));
        }
        if self.payload.is_empty() {
            return Err(PipelineError::Download("empty response body".into()));
        }
        let total = self.payload.len() as u64;
        on_progress(0, Some(total));
        let mut file = std::fs::File::create(dest)?;
        file.write_all(&self.payload)?;
        on_progress(total, Some(total));
        Ok(total)
    }
}

/// Holds `generate` calls whose text contains a registered keyword until the
/// keyword's sender fires.
#[derive(Clone)]
pub struct GenerateGates {
    gates: Arc<Mutex<Vec<(String, crossbeam_channel::Receiver<()>)>>>,
    entered_tx: crossbeam_channel::Sender<String>,
    entered_rx: crossbeam_channel::Receiver<String>,
}

impl Default for GenerateGates {
    fn default() -> Self {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        Self {
            gates: Arc::new(Mutex::new(Vec::new())),
            entered_tx,
            entered_rx,
        }
    }
}

impl GenerateGates {
    /// Block generation of any sentence containing `keyword`.
    pub fn gate(&self, keyword: &str) -> crossbeam_channel::Sender<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.gates
            .lock()
            .expect("gates lock")
            .push((keyword.to_owned(), rx));
        tx
    }

    /// Wait until some generation is held at a gate; returns its text.
    pub fn wait_entered(&self) -> String {
        self.entered_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("no generation reached a gate")
    }

    fn hold(&self, text: &str) {
        let gate = self
            .gates
            .lock()
            .expect("gates lock")
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, rx)| rx.clone());
        if let Some(rx) = gate {
            let _ = self.entered_tx.send(text.to_owned());
            let _ = rx.recv_timeout(Duration::from_secs(10));
        }
    }
}

/// Engine whose sessions emit one sample per input character.
pub struct FakeEngine {
    sample_rate: u32,
    voices: u32,
    create_delay: Duration,
    pub created: AtomicUsize,
    pub destroyed: Arc<AtomicUsize>,
    pub fail_next_create: AtomicBool,
    pub gates: GenerateGates,
}

impl FakeEngine {
    pub fn new(sample_rate: u32, voices: u32) -> Self {
        Self {
            sample_rate,
            voices,
            create_delay: Duration::ZERO,
            created: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
            fail_next_create: AtomicBool::new(false),
            gates: GenerateGates::default(),
        }
    }

    pub fn with_create_delay_ms(mut self, ms: u64) -> Self {
        self.create_delay = Duration::from_millis(ms);
        self
    }
}

impl SpeechEngine for FakeEngine {
    fn create(&self, _config: &EngineConfig) -> Result<Box<dyn EngineSession>> {
        std::thread::sleep(self.create_delay);
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::EngineInit("engine returned no session".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut session = FakeSession::new(self.sample_rate, self.voices);
        session.destroyed = Arc::clone(&self.destroyed);
        session.gates = self.gates.clone();
        Ok(Box::new(session))
    }
}

/// Session that fails on sentences containing `FAIL` and returns nothing for
/// sentences containing `EMPTY`.
pub struct FakeSession {
    sample_rate: u32,
    voices: u32,
    pub generated: Arc<Mutex<Vec<String>>>,
    pub destroyed: Arc<AtomicUsize>,
    pub gates: GenerateGates,
}

impl FakeSession {
    pub fn new(sample_rate: u32, voices: u32) -> Self {
        Self {
            sample_rate,
            voices,
            generated: Arc::new(Mutex::new(Vec::new())),
            destroyed: Arc::new(AtomicUsize::new(0)),
            gates: GenerateGates::default(),
        }
    }
}

impl EngineSession for FakeSession {
    fn num_voices(&self) -> u32 {
        self.voices
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&mut self, text: &str, _voice_id: u32, _speed: f32) -> Result<GeneratedAudio> {
        self.generated.lock().expect("generated lock").push(text.to_owned());
        self.gates.hold(text);
        if text.contains("FAIL") {
            return Err(PipelineError::Tts(format!("cannot generate '{text}'")));
        }
        let len = if text.contains("EMPTY") {
            0
        } else {
            text.chars().count()
        };
        Ok(GeneratedAudio::new(vec![0.1; len], self.sample_rate))
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct LogState {
    opened_rates: Vec<u32>,
    play_calls: usize,
    pause_calls: usize,
    fail_next_play: bool,
}

/// Shared record of what a [`FakeBackend`] was asked to do.
#[derive(Clone, Default)]
pub struct BackendLog(Arc<Mutex<LogState>>);

impl BackendLog {
    fn with<T>(&self, f: impl FnOnce(&mut LogState) -> T) -> T {
        f(&mut *self.0.lock().expect("backend log lock"))
    }

    pub fn opened_rates(&self) -> Vec<u32> {
        self.with(|s| s.opened_rates.clone())
    }

    pub fn play_calls(&self) -> usize {
        self.with(|s| s.play_calls)
    }

    pub fn pause_calls(&self) -> usize {
        self.with(|s| s.pause_calls)
    }

    pub fn fail_next_play(&self) {
        self.with(|s| s.fail_next_play = true);
    }
}

/// Output backend that records calls instead of touching a device.
#[derive(Default)]
pub struct FakeBackend {
    log: BackendLog,
    draining: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose streams consume the whole queue as soon as they start.
    pub fn draining() -> Self {
        Self {
            draining: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> BackendLog {
        self.log.clone()
    }
}

struct FakeStream {
    log: BackendLog,
    queue: SampleQueue,
    draining: bool,
}

impl OutputStream for FakeStream {
    fn play(&mut self) -> Result<()> {
        let fail = self.log.with(|s| {
            s.play_calls += 1;
            std::mem::take(&mut s.fail_next_play)
        });
        if fail {
            return Err(PipelineError::Audio("device refused to start".into()));
        }
        if self.draining {
            self.queue.lock().expect("queue lock").clear();
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.log.with(|s| s.pause_calls += 1);
        Ok(())
    }
}

impl OutputBackend for FakeBackend {
    fn open(&mut self, sample_rate: u32, queue: SampleQueue) -> Result<Box<dyn OutputStream>> {
        self.log.with(|s| s.opened_rates.push(sample_rate));
        Ok(Box::new(FakeStream {
            log: self.log.clone(),
            queue,
            draining: self.draining,
        }))
    }
}
