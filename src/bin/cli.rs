//! CLI binary for voxpipe.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxpipe::audio::playback::list_output_devices;
use voxpipe::audio::wav::write_wav;
use voxpipe::{Controller, Language, PipelineConfig, ProgressCallback, ProgressEvent};

/// voxpipe: offline per-language text-to-speech.
#[derive(Parser)]
#[command(name = "voxpipe", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// List supported languages and their download status.
    Languages,

    /// Download and extract a language's model.
    Download {
        /// Language identifier (e.g. `english`).
        language: Language,
    },

    /// Delete a language's model from disk.
    Delete {
        /// Language identifier.
        language: Language,
    },

    /// Speak text, downloading the model first if needed.
    Speak {
        /// Language identifier.
        language: Language,

        /// Text to speak.
        text: String,

        /// Voice / speaker index.
        #[arg(long)]
        voice: Option<u32>,

        /// Speed multiplier.
        #[arg(long)]
        speed: Option<f32>,

        /// Write a WAV file instead of playing through the speakers.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// List available audio output devices.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy dependency logs by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voxpipe=info,ort=warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => PipelineConfig::from_file(path)?,
        None => {
            let default_path = PipelineConfig::default_config_path();
            if default_path.is_file() {
                PipelineConfig::from_file(&default_path)?
            } else {
                PipelineConfig::default()
            }
        }
    };

    match cli.command {
        Command::Devices => list_devices(),
        Command::Languages => list_languages(config),
        Command::Download { language } => {
            let controller = Controller::with_defaults(config)?.with_progress(progress_bar());
            let result = controller.download_model(language).await;
            controller.shutdown();
            result?;
            println!("{} model ready", language.profile().display_name);
            Ok(())
        }
        Command::Delete { language } => {
            let controller = Controller::with_defaults(config)?;
            let result = controller.delete_model(language).await;
            controller.shutdown();
            result?;
            println!("{} model deleted", language.profile().display_name);
            Ok(())
        }
        Command::Speak {
            language,
            text,
            voice,
            speed,
            save,
        } => {
            let voice = voice.unwrap_or(config.tts.voice_id);
            let speed = speed.unwrap_or(config.tts.speed);
            let controller = Controller::with_defaults(config)?.with_progress(progress_bar());
            let result = speak(&controller, language, &text, voice, speed, save).await;
            controller.shutdown();
            result
        }
    }
}

async fn speak(
    controller: &Controller,
    language: Language,
    text: &str,
    voice: u32,
    speed: f32,
    save: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !controller.registry().is_downloaded(language) {
        controller.download_model(language).await?;
    }
    let voices = controller.switch_language(language).await?;
    if !voices.contains(&voice) {
        anyhow::bail!(
            "voice {voice} not available for {language} (model has {})",
            voices.len()
        );
    }

    if let Some(path) = save {
        let (audio, report) = controller.render(text, voice, speed).await?;
        write_wav(&path, &audio)?;
        println!(
            "wrote {:.1}s of audio to {} ({})",
            audio.duration_secs(),
            path.display(),
            report.summary()
        );
        return Ok(());
    }

    let report = controller.synthesize(text, voice, speed).await?;
    if let Some(reason) = &report.aborted {
        anyhow::bail!("playback failed: {reason}");
    }
    let playback = controller.playback().clone();
    tokio::task::spawn_blocking(move || playback.wait_idle(Duration::from_secs(600))).await??;
    println!("{}", report.summary());
    Ok(())
}

fn list_languages(config: PipelineConfig) -> anyhow::Result<()> {
    let controller = Controller::with_defaults(config)?;
    println!("Models in {}:", controller.registry().root().display());
    for language in Language::ALL {
        let profile = language.profile();
        println!(
            "  {} {:<10} {:<9} {:>8}  {}",
            profile.flag,
            profile.display_name,
            language.id(),
            profile.size_estimate,
            controller.registry().status(language)
        );
    }
    controller.shutdown();
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in list_output_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

/// Progress callback rendering downloads with an indicatif bar.
fn progress_bar() -> ProgressCallback {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
    ) {
        pb.set_style(style);
    }
    Box::new(move |event| match event {
        ProgressEvent::DownloadStarted { language, .. } => {
            pb.reset();
            pb.set_message(language.profile().archive_id);
        }
        ProgressEvent::DownloadProgress {
            bytes_downloaded,
            total_bytes,
            ..
        } => {
            if let Some(total) = total_bytes {
                pb.set_length(total);
            }
            pb.set_position(bytes_downloaded);
        }
        ProgressEvent::DownloadComplete { .. } => pb.finish(),
        ProgressEvent::ExtractStarted { language } => {
            pb.println(format!("  extracting {language}…"));
        }
        ProgressEvent::ExtractComplete { .. } => {}
        ProgressEvent::LoadStarted { language } => {
            pb.println(format!("  loading {language} model…"));
        }
        ProgressEvent::LoadComplete {
            language,
            duration_secs,
        } => {
            pb.println(format!("  {language} model loaded in {duration_secs:.1}s"));
        }
        ProgressEvent::Error { language, message } => {
            pb.abandon();
            eprintln!("  {language}: {message}");
        }
    })
}
