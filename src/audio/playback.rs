//! Audio streamer: a lazily-connected playback graph fed from a sample queue.
//!
//! The graph is opened at the sample rate of the first buffer it receives.
//! Later buffers at the same rate are appended to the queue, so consecutive
//! sentences play back to back. A buffer at a different rate tears the graph
//! down and opens a fresh one; the output format is never changed in place.

use crate::config::AudioConfig;
use crate::error::{PipelineError, Result};
use crate::language::Language;
use crate::tts::engine::GeneratedAudio;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Mono f32 samples waiting to be rendered.
pub type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

fn lock_queue(queue: &SampleQueue) -> MutexGuard<'_, VecDeque<f32>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A running (or paused) connection to the output device.
pub trait OutputStream {
    /// Start or resume rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the device refuses to start.
    fn play(&mut self) -> Result<()>;

    /// Stop rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the device refuses to stop.
    fn pause(&mut self) -> Result<()>;
}

/// Opens output streams that pull from a [`SampleQueue`].
pub trait OutputBackend: Send {
    /// Open a mono stream at `sample_rate`. The stream is created paused.
    ///
    /// # Errors
    ///
    /// Returns an error if no device is available or the format is rejected.
    fn open(&mut self, sample_rate: u32, queue: SampleQueue) -> Result<Box<dyn OutputStream>>;
}

/// The switch that currently drives playback: a language plus the
/// generation of the switch that selected it.
///
/// Re-selecting the same language produces a new generation, so buffers from
/// a synthesis started before the switch no longer match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOwner {
    pub language: Language,
    pub generation: u64,
}

impl PlaybackOwner {
    pub fn new(language: Language, generation: u64) -> Self {
        Self {
            language,
            generation,
        }
    }
}

struct Graph {
    sample_rate: u32,
    queue: SampleQueue,
    stream: Box<dyn OutputStream>,
    running: bool,
}

/// Playback graph state machine, driven by one switch at a time.
pub struct AudioStreamer {
    backend: Box<dyn OutputBackend>,
    graph: Option<Graph>,
    owner: Option<PlaybackOwner>,
    connects: usize,
}

impl AudioStreamer {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            backend,
            graph: None,
            owner: None,
            connects: 0,
        }
    }

    /// Tear the graph down and hand it to `owner`.
    ///
    /// Buffers tagged with any other owner are dropped from now on.
    pub fn reset(&mut self, owner: PlaybackOwner) {
        self.teardown();
        info!(
            language = %owner.language,
            generation = owner.generation,
            "playback graph reset"
        );
        self.owner = Some(owner);
    }

    /// Stop the stream, discard queued samples and release the device.
    pub fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            if graph.running
                && let Err(e) = graph.stream.pause()
            {
                warn!("failed to stop output stream: {e}");
            }
            lock_queue(&graph.queue).clear();
            debug!(sample_rate = graph.sample_rate, "playback graph disconnected");
        }
    }

    /// Switch currently allowed to drive playback.
    pub fn owner(&self) -> Option<PlaybackOwner> {
        self.owner
    }

    /// Sample rate of the connected graph, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.graph.as_ref().map(|g| g.sample_rate)
    }

    /// Whether the stream is connected and rendering.
    pub fn is_running(&self) -> bool {
        self.graph.as_ref().is_some_and(|g| g.running)
    }

    /// How many times a graph has been opened.
    pub fn connect_count(&self) -> usize {
        self.connects
    }

    /// Samples still waiting to be rendered.
    pub fn queued_samples(&self) -> usize {
        self.graph
            .as_ref()
            .map_or(0, |g| lock_queue(&g.queue).len())
    }

    /// Play a buffer produced under `owner`.
    ///
    /// Returns `Ok(false)` without touching the graph if `owner` no longer
    /// drives playback.
    ///
    /// # Errors
    ///
    /// See [`AudioStreamer::play`].
    pub fn play_for(&mut self, owner: PlaybackOwner, audio: &GeneratedAudio) -> Result<bool> {
        if self.owner != Some(owner) {
            debug!(
                ?owner,
                current = ?self.owner,
                "dropping buffer from a switch that no longer owns playback"
            );
            return Ok(false);
        }
        self.play(audio)?;
        Ok(true)
    }

    /// Queue `audio` for gapless playback, connecting the graph first if it is
    /// absent or running at another rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be opened or started. The graph is
    /// torn down in that case and reopened by the next call.
    pub fn play(&mut self, audio: &GeneratedAudio) -> Result<()> {
        if audio.sample_rate == 0 {
            return Err(PipelineError::Audio("buffer has a zero sample rate".into()));
        }
        if self.sample_rate() != Some(audio.sample_rate) {
            self.connect(audio.sample_rate)?;
        }
        let Some(graph) = self.graph.as_mut() else {
            return Err(PipelineError::Audio("playback graph not connected".into()));
        };

        lock_queue(&graph.queue).extend(audio.samples.iter().copied());

        if !graph.running {
            if let Err(e) = graph.stream.play() {
                error!("failed to start output stream: {e}");
                self.teardown();
                return Err(e);
            }
            graph.running = true;
        }
        Ok(())
    }

    fn connect(&mut self, sample_rate: u32) -> Result<()> {
        if let Some(previous) = self.sample_rate() {
            info!(from = previous, to = sample_rate, "sample rate changed, reconnecting");
        }
        self.teardown();
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let stream = self.backend.open(sample_rate, Arc::clone(&queue))?;
        self.connects += 1;
        info!(sample_rate, "playback graph connected");
        self.graph = Some(Graph {
            sample_rate,
            queue,
            stream,
            running: false,
        });
        Ok(())
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Output backend for the system audio device.
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.output_device.clone(),
        }
    }

    fn device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.device_name {
            host.output_devices()
                .map_err(|e| PipelineError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| PipelineError::Audio(format!("output device '{name}' not found")))
        } else {
            host.default_output_device()
                .ok_or_else(|| PipelineError::Audio("no default output device".into()))
        }
    }
}

struct CpalStream(cpal::Stream);

impl OutputStream for CpalStream {
    fn play(&mut self) -> Result<()> {
        self.0
            .play()
            .map_err(|e| PipelineError::Audio(format!("failed to start output stream: {e}")))
    }

    fn pause(&mut self) -> Result<()> {
        self.0
            .pause()
            .map_err(|e| PipelineError::Audio(format!("failed to pause output stream: {e}")))
    }
}

impl OutputBackend for CpalBackend {
    fn open(&mut self, sample_rate: u32, queue: SampleQueue) -> Result<Box<dyn OutputStream>> {
        let device = self.device()?;
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!(sample_rate, "opening output device: {device_name}");

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut queue = match queue.lock() {
                        Ok(q) => q,
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for sample in data.iter_mut() {
                        *sample = queue.pop_front().unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| PipelineError::Audio(format!("failed to build output stream: {e}")))?;

        Ok(Box::new(CpalStream(stream)))
    }
}

/// Names of the available output devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PipelineError::Audio(format!("cannot enumerate devices: {e}")))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(desc) = device.description() {
            names.push(desc.name().to_owned());
        }
    }
    Ok(names)
}
