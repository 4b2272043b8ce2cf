//! Downloads over real HTTP against a mock archive host.

use crate::helpers::{NullDevice, ToneEngine, archive_for};
use std::sync::{Arc, Mutex};
use voxpipe::config::ModelConfig;
use voxpipe::models::fetch::HttpFetcher;
use voxpipe::{Controller, DownloadStatus, Language, PipelineConfig, PipelineError, ProgressEvent};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn controller_for(server: &MockServer, root: &std::path::Path) -> Controller {
    let config = PipelineConfig {
        models: ModelConfig {
            root_dir: root.to_path_buf(),
            base_url: format!("{}/tts-models/", server.uri()),
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
            ..ModelConfig::default()
        },
        ..PipelineConfig::default()
    };
    let fetcher = Arc::new(HttpFetcher::new(&config.models));
    let (device, _) = NullDevice::new();
    Controller::new(config, Arc::new(ToneEngine::new(2)), fetcher, Box::new(device))
        .expect("build controller")
}

#[tokio::test(flavor = "multi_thread")]
async fn download_over_http_reports_progress_and_extracts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tts-models/kokoro-en-v0_19.tar.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_for(Language::English)))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let controller = controller_for(&server, root.path()).with_progress(Box::new(move |event| {
        sink.lock().unwrap().push(event);
    }));

    controller.download_model(Language::English).await.unwrap();

    let events = events.lock().unwrap();
    match events.first() {
        Some(ProgressEvent::DownloadStarted { language, url }) => {
            assert_eq!(*language, Language::English);
            assert!(url.ends_with("/tts-models/kokoro-en-v0_19.tar.bz2"), "{url}");
        }
        other => panic!("expected DownloadStarted first, got {other:?}"),
    }
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ProgressEvent::DownloadComplete { bytes, .. } if *bytes > 0))
    );
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::ExtractComplete { .. })
    ));

    let dir = root.path().join("english");
    assert!(dir.join("model.onnx").is_file());
    assert!(dir.join("tokens.txt").is_file());
    assert!(dir.join("espeak-ng-data").is_dir());
    let leftovers: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "temporary archive left behind");

    controller.switch_language(Language::English).await.unwrap();
    controller.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_archive_fails_and_can_be_retried() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let controller = controller_for(&server, root.path());

    let err = controller
        .download_model(Language::Spanish)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Download(_)));
    assert!(matches!(
        controller.registry().status(Language::Spanish),
        DownloadStatus::Failed(_)
    ));
    assert!(!controller.registry().is_downloaded(Language::Spanish));
    assert!(controller.state().status.starts_with("Download failed"));

    Mock::given(method("GET"))
        .and(path("/tts-models/vits-piper-es_ES-davefx-medium.tar.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_for(Language::Spanish)))
        .mount(&server)
        .await;

    controller.download_model(Language::Spanish).await.unwrap();
    assert_eq!(
        controller.registry().status(Language::Spanish),
        DownloadStatus::Downloaded
    );
    controller.shutdown();
}
