//! Shared helpers for integration tests: archive builders and fakes that stand
//! in for the network, the inference engine and the audio device.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxpipe::audio::playback::{OutputBackend, OutputStream, SampleQueue};
use voxpipe::config::ModelConfig;
use voxpipe::models::fetch::{ArchiveFetcher, FetchProgress};
use voxpipe::tts::engine::{EngineConfig, EngineSession, GeneratedAudio, SpeechEngine};
use voxpipe::{Controller, Language, PipelineConfig, PipelineError, Result};

/// Build a `.tar.bz2` holding every artifact `language` needs, nested under
/// the language's archive directory name.
pub(crate) fn archive_for(language: Language) -> Vec<u8> {
    let profile = language.profile();
    let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    let mut append = |name: String, data: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data)
            .expect("append archive entry");
    };
    for name in profile.required_files() {
        if Some(name) == profile.dict_dir {
            append(format!("{}/{name}/jieba.dict.utf8", profile.archive_id), b"dict");
        } else {
            append(format!("{}/{name}", profile.archive_id), b"artifact");
        }
    }
    if profile.needs_phonemizer_data() {
        append(
            format!("{}/espeak-ng-data/phontab", profile.archive_id),
            b"phonemes",
        );
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish bzip2")
}

/// Fetcher that serves a per-language archive chosen from the URL.
pub(crate) struct ArchiveServer {
    pub(crate) calls: AtomicUsize,
    delay: Duration,
}

impl ArchiveServer {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Server that holds each request for `ms` before answering.
    pub(crate) fn slow(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            ..Self::new()
        }
    }
}

impl ArchiveFetcher for ArchiveServer {
    fn fetch(&self, url: &str, dest: &Path, on_progress: FetchProgress<'_>) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let language = Language::ALL
            .into_iter()
            .find(|l| url.ends_with(&l.profile().archive_file_name("tar.bz2")))
            .ok_or_else(|| PipelineError::Download(format!("server returned HTTP 404 for {url}")))?;
        let payload = archive_for(language);
        let total = payload.len() as u64;
        let mut file = std::fs::File::create(dest)?;
        file.write_all(&payload)?;
        on_progress(total, Some(total));
        Ok(total)
    }
}

/// Engine whose sessions produce one sample per character at a fixed rate
/// per language, and fail on sentences containing `FAIL`.
pub(crate) struct ToneEngine {
    voices: u32,
}

impl ToneEngine {
    pub(crate) fn new(voices: u32) -> Self {
        Self { voices }
    }

    /// 24 kHz for the voice-embedding model, 22.05 kHz for everything else.
    pub(crate) fn rate_for(model: &Path) -> u32 {
        if model.ends_with("model.onnx") {
            24_000
        } else {
            22_050
        }
    }
}

struct ToneSession {
    voices: u32,
    sample_rate: u32,
}

impl SpeechEngine for ToneEngine {
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn EngineSession>> {
        if !config.model.is_file() {
            return Err(PipelineError::EngineInit(format!(
                "model missing: {}",
                config.model.display()
            )));
        }
        Ok(Box::new(ToneSession {
            voices: self.voices,
            sample_rate: Self::rate_for(&config.model),
        }))
    }
}

impl EngineSession for ToneSession {
    fn num_voices(&self) -> u32 {
        self.voices
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&mut self, text: &str, _voice_id: u32, _speed: f32) -> Result<GeneratedAudio> {
        if text.contains("FAIL") {
            return Err(PipelineError::Tts(format!("cannot generate '{text}'")));
        }
        Ok(GeneratedAudio::new(
            vec![0.25; text.chars().count()],
            self.sample_rate,
        ))
    }
}

/// Record of what the fake output device was asked to do.
#[derive(Clone, Default)]
pub(crate) struct DeviceLog {
    opened: Arc<Mutex<Vec<u32>>>,
}

impl DeviceLog {
    pub(crate) fn opened_rates(&self) -> Vec<u32> {
        self.opened.lock().expect("device log lock").clone()
    }
}

/// Output backend that consumes samples as soon as it starts.
pub(crate) struct NullDevice {
    log: DeviceLog,
}

impl NullDevice {
    pub(crate) fn new() -> (Self, DeviceLog) {
        let log = DeviceLog::default();
        (Self { log: log.clone() }, log)
    }
}

struct NullStream {
    queue: SampleQueue,
}

impl OutputStream for NullStream {
    fn play(&mut self) -> Result<()> {
        self.queue.lock().expect("queue lock").clear();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }
}

impl OutputBackend for NullDevice {
    fn open(&mut self, sample_rate: u32, queue: SampleQueue) -> Result<Box<dyn OutputStream>> {
        self.log.opened.lock().expect("device log lock").push(sample_rate);
        Ok(Box::new(NullStream { queue }))
    }
}

/// A controller wired to fakes, rooted in a fresh temp directory.
pub(crate) struct Harness {
    pub(crate) controller: Controller,
    pub(crate) server: Arc<ArchiveServer>,
    pub(crate) device: DeviceLog,
    pub(crate) root: tempfile::TempDir,
}

pub(crate) fn harness(server: ArchiveServer) -> Harness {
    let root = tempfile::tempdir().expect("create temp dir");
    let config = PipelineConfig {
        models: ModelConfig {
            root_dir: root.path().join("tts-models"),
            phonemizer_data_dir: Some(root.path().join("shared-espeak")),
            ..ModelConfig::default()
        },
        ..PipelineConfig::default()
    };
    let server = Arc::new(server);
    let (device, log) = NullDevice::new();
    let controller = Controller::new(
        config,
        Arc::new(ToneEngine::new(3)),
        server.clone(),
        Box::new(device),
    )
    .expect("build controller");
    Harness {
        controller,
        server,
        device: log,
        root,
    }
}
