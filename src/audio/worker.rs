//! Dedicated playback thread.
//!
//! Output streams are not `Send`, so the [`AudioStreamer`] lives on its own
//! thread and is driven over a crossbeam channel. [`PlaybackHandle`] is the
//! cloneable, `Send` front end.

use super::playback::{AudioStreamer, OutputBackend, PlaybackOwner};
use crate::error::{PipelineError, Result};
use crate::tts::engine::GeneratedAudio;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Snapshot of the streamer, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub owner: Option<PlaybackOwner>,
    pub sample_rate: Option<u32>,
    pub running: bool,
    pub connects: usize,
    pub queued_samples: usize,
}

enum Command {
    Reset(PlaybackOwner),
    Play {
        owner: PlaybackOwner,
        audio: GeneratedAudio,
        reply: Sender<Result<bool>>,
    },
    Inspect(Sender<PlaybackState>),
    Shutdown,
}

/// Cloneable handle to the playback thread.
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: Sender<Command>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackHandle {
    /// Spawn the playback thread around `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(backend: Box<dyn OutputBackend>) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("voxpipe-playback".to_owned())
            .spawn(move || run(AudioStreamer::new(backend), rx))
            .map_err(|e| PipelineError::Audio(format!("failed to spawn playback thread: {e}")))?;
        Ok(Self {
            tx,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| PipelineError::Channel("playback thread has stopped".into()))
    }

    /// Tear the graph down and hand playback to `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback thread has stopped.
    pub fn reset(&self, owner: PlaybackOwner) -> Result<()> {
        self.send(Command::Reset(owner))
    }

    /// Queue one buffer produced under `owner` and wait for the streamer to
    /// accept it. `Ok(false)` means the buffer was dropped as stale.
    ///
    /// # Errors
    ///
    /// Returns the streamer's playback error, or a channel error if the
    /// playback thread has stopped.
    pub fn play(&self, owner: PlaybackOwner, audio: GeneratedAudio) -> Result<bool> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Command::Play {
            owner,
            audio,
            reply,
        })?;
        rx.recv()
            .map_err(|_| PipelineError::Channel("playback thread dropped the reply".into()))?
    }

    /// Current streamer state.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback thread has stopped.
    pub fn state(&self) -> Result<PlaybackState> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Command::Inspect(reply))?;
        rx.recv()
            .map_err(|_| PipelineError::Channel("playback thread dropped the reply".into()))
    }

    /// Block until every queued sample has been rendered or `timeout` passes.
    /// Returns `true` if the queue drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback thread has stopped.
    pub fn wait_idle(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state()?.queued_samples == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Stop the playback thread and wait for it to exit. Idempotent.
    pub fn shutdown(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                error!("playback thread panicked");
            }
        }
    }
}

fn run(mut streamer: AudioStreamer, rx: Receiver<Command>) {
    info!("playback thread started");
    while let Ok(command) = rx.recv() {
        match command {
            Command::Reset(owner) => streamer.reset(owner),
            Command::Play {
                owner,
                audio,
                reply,
            } => {
                let result = streamer.play_for(owner, &audio);
                drop(audio);
                if reply.send(result).is_err() {
                    debug!("play reply receiver dropped");
                }
            }
            Command::Inspect(reply) => {
                let _ = reply.send(PlaybackState {
                    owner: streamer.owner(),
                    sample_rate: streamer.sample_rate(),
                    running: streamer.is_running(),
                    connects: streamer.connect_count(),
                    queued_samples: streamer.queued_samples(),
                });
            }
            Command::Shutdown => break,
        }
    }
    streamer.teardown();
    info!("playback thread stopped");
}
