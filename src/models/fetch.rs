//! Archive fetcher: downloads one language archive to a local file.

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Progress sink: `(bytes_received, total_bytes)`.
pub type FetchProgress<'a> = &'a dyn Fn(u64, Option<u64>);

/// Downloads an archive from a URL into a local file.
///
/// Implementations block; callers run them on a worker context. No retry is
/// attempted internally: retry is a fresh call.
pub trait ArchiveFetcher: Send + Sync {
    /// Fetch `url` into `dest`, reporting byte progress.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Download`] on network failure, a non-2xx
    /// response, or an empty payload. `dest` is removed on failure.
    fn fetch(&self, url: &str, dest: &Path, on_progress: FetchProgress<'_>) -> Result<u64>;
}

/// Blocking HTTP fetcher backed by `ureq`.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Build a fetcher with the timeouts from `config`.
    pub fn new(config: &ModelConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .user_agent(concat!("voxpipe/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn fetch_inner(&self, url: &str, dest: &Path, on_progress: FetchProgress<'_>) -> Result<u64> {
        let resp = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                PipelineError::Download(format!("server returned HTTP {code} for {url}"))
            }
            ureq::Error::Transport(t) => PipelineError::Download(format!("network error: {t}")),
        })?;

        let total_bytes = resp
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());
        debug!(url, ?total_bytes, "archive response received");

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(dest)?;
        let mut reader = resp.into_reader();
        let mut buf = vec![0u8; 64 * 1024];
        let mut bytes_downloaded: u64 = 0;
        on_progress(0, total_bytes);
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| PipelineError::Download(format!("download read error: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            bytes_downloaded += n as u64;
            on_progress(bytes_downloaded, total_bytes);
        }
        file.flush()?;

        if bytes_downloaded == 0 {
            return Err(PipelineError::Download(format!(
                "empty response body from {url}"
            )));
        }
        Ok(bytes_downloaded)
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path, on_progress: FetchProgress<'_>) -> Result<u64> {
        info!("fetching {url}");
        match self.fetch_inner(url, dest, on_progress) {
            Ok(bytes) => {
                info!(bytes, "archive saved to {}", dest.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(dest);
                Err(e)
            }
        }
    }
}
