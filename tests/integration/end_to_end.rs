//! Whole-pipeline flows through the controller: download, extract, load,
//! synthesize and play, with fakes at the network, engine and device seams.

use crate::helpers::{ArchiveServer, harness};
use std::sync::atomic::Ordering;
use voxpipe::models::DownloadOutcome;
use voxpipe::pipeline::controller::{STATUS_NOT_DOWNLOADED, STATUS_READY};
use voxpipe::{DownloadStatus, Language, PipelineError};

#[tokio::test(flavor = "multi_thread")]
async fn fresh_install_download_switch_and_speak() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;

    let err = c.switch_language(Language::English).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotDownloaded(Language::English)));
    assert_eq!(c.state().status, STATUS_NOT_DOWNLOADED);

    assert_eq!(
        c.download_model(Language::English).await.unwrap(),
        DownloadOutcome::Completed
    );
    let english_dir = c.registry().language_dir(Language::English);
    assert!(english_dir.join("model.onnx").is_file());
    assert!(english_dir.join("voices.bin").is_file());

    let voices = c.switch_language(Language::English).await.unwrap();
    assert_eq!(voices, vec![0, 1, 2]);
    assert_eq!(c.state().status, STATUS_READY);

    let report = c
        .synthesize("Hello world. How are you?", 1, 1.0)
        .await
        .unwrap();
    assert_eq!(report.sentences, 2);
    assert_eq!(report.played, 2);
    assert!(report.first_audio_latency.is_some());
    assert!(c.state().status.starts_with(STATUS_READY));
    assert_eq!(h.device.opened_rates(), vec![24_000]);

    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_sentence_is_skipped_and_the_rest_plays() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;
    c.download_model(Language::Spanish).await.unwrap();
    c.switch_language(Language::Spanish).await.unwrap();

    let report = c.synthesize("Uno. FAIL dos. Tres!", 0, 1.0).await.unwrap();

    assert_eq!((report.sentences, report.played, report.skipped), (3, 2, 1));
    assert!(report.aborted.is_none());
    assert!(report.summary().contains("1 skipped"), "{}", report.summary());
    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn playback_follows_each_language_sample_rate() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;
    c.download_model(Language::English).await.unwrap();
    c.download_model(Language::French).await.unwrap();

    c.switch_language(Language::English).await.unwrap();
    c.synthesize("Good morning.", 0, 1.0).await.unwrap();
    c.switch_language(Language::French).await.unwrap();
    c.synthesize("Bonjour. Ça va?", 0, 1.0).await.unwrap();
    c.switch_language(Language::English).await.unwrap();
    c.synthesize("Welcome back.", 0, 1.0).await.unwrap();

    assert_eq!(h.device.opened_rates(), vec![24_000, 22_050, 24_000]);
    assert_eq!(
        c.pool().loaded(),
        vec![Language::English, Language::French]
    );
    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn lexicon_language_loads_without_phonemizer_data() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;
    c.download_model(Language::Chinese).await.unwrap();

    let dir = c.registry().language_dir(Language::Chinese);
    assert!(dir.join("lexicon.txt").is_file());
    assert!(dir.join("dict").is_dir());

    c.switch_language(Language::Chinese).await.unwrap();
    let report = c.synthesize("你好\n今天天气很好", 0, 1.0).await.unwrap();
    assert_eq!(report.played, 2);
    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_downloads_fetch_once() {
    let h = harness(ArchiveServer::slow(300));
    let c = &h.controller;

    let (first, second) = tokio::join!(
        c.download_model(Language::Arabic),
        c.download_model(Language::Arabic)
    );

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| *o == DownloadOutcome::AlreadyInProgress);
    assert_eq!(
        outcomes,
        vec![DownloadOutcome::Completed, DownloadOutcome::AlreadyInProgress]
    );
    assert_eq!(h.server.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        c.registry().status(Language::Arabic),
        DownloadStatus::Downloaded
    );
    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn download_status_is_published_to_subscribers() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;
    let mut downloads = c.subscribe_downloads();

    c.download_model(Language::French).await.unwrap();

    assert!(downloads.has_changed().unwrap());
    let snapshot = downloads.borrow_and_update().clone();
    assert_eq!(
        snapshot.get(&Language::French),
        Some(&DownloadStatus::Downloaded)
    );
    assert_eq!(
        snapshot.get(&Language::English),
        Some(&DownloadStatus::NotDownloaded)
    );
    c.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_returns_language_to_not_downloaded() {
    let h = harness(ArchiveServer::new());
    let c = &h.controller;
    c.download_model(Language::French).await.unwrap();
    assert!(h.root.path().join("tts-models").join("french").is_dir());

    c.delete_model(Language::French).await.unwrap();
    c.delete_model(Language::French).await.unwrap();

    assert_eq!(
        c.registry().status(Language::French),
        DownloadStatus::NotDownloaded
    );
    let err = c.switch_language(Language::French).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotDownloaded(Language::French)));
    c.shutdown();
}
