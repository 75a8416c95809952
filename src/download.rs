// Artifact downloads with progress hooks and bounded retries

use crate::constants::{DEFAULT_MAX_RETRIES, MAX_RETRY_WAIT_SECS};
use crate::error::DownloadError;
use crate::updaters::http::{self, Headers};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
    pub headers: Headers,
    pub display_name: String,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let display_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            url: url.into(),
            destination,
            headers: Headers::new(),
            display_name,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Progress hooks. Several downloads report at once, so implementations
/// synchronize internally.
pub trait DownloadObserver: Send + Sync {
    fn on_start(&self, _job: &DownloadJob, _total_bytes: Option<u64>) {}
    fn on_progress(&self, _job: &DownloadJob, _downloaded: u64) {}
    fn on_finish(&self, _job: &DownloadJob) {}
    fn on_cancel(&self, _job: &DownloadJob) {}
    fn on_error(&self, _job: &DownloadJob, _error: &DownloadError) {}
}

/// A transport able to fetch a `DownloadJob`
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        job: &DownloadJob,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError>;
}

/// Streams the body with the shared reqwest client
#[derive(Debug, Default)]
pub struct HttpDownloader;

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        job: &DownloadJob,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        if cancel.is_cancelled() {
            observer.on_cancel(job);
            return Err(DownloadError::Cancelled);
        }

        let mut response = http::with_headers(http::client().get(&job.url), &job.headers)
            .send()
            .await
            .map_err(|e| DownloadError::Transfer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: job.url.clone(),
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = job.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let total = response.content_length();
        observer.on_start(job, total);

        let mut file = tokio::fs::File::create(&job.destination).await?;
        let mut downloaded: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                drop(file);
                if let Err(e) = tokio::fs::remove_file(&job.destination).await {
                    debug!("Could not remove partial {}: {}", job.destination.display(), e);
                }
                observer.on_cancel(job);
                return Err(DownloadError::Cancelled);
            }
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await?;
                    downloaded += chunk.len() as u64;
                    observer.on_progress(job, downloaded);
                }
                Ok(None) => break,
                Err(e) => return Err(DownloadError::Transfer(e.to_string())),
            }
        }

        if let Some(total) = total.filter(|&total| downloaded < total) {
            return Err(DownloadError::Transfer(format!(
                "connection closed after {} of {} bytes",
                downloaded, total
            )));
        }
        file.flush().await?;
        observer.on_finish(job);

        file.sync_all()
            .await
            .map_err(|e| DownloadError::AfterFinish(e.to_string()))?;
        Ok(())
    }
}

/// How often and how patiently a download is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            max_wait: Duration::from_secs(MAX_RETRY_WAIT_SECS),
        }
    }

    /// Wait after the failed `attempt` (1-based): 2^attempt - 1 seconds, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = 2u64.saturating_pow(attempt).saturating_sub(1);
        Duration::from_secs(secs).min(self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Run `job` until it succeeds, fails for good, or runs out of retries.
/// Partial files are left for the caller to clean up.
pub async fn managed_download(
    downloader: &dyn Downloader,
    job: &DownloadJob,
    observer: &dyn DownloadObserver,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> bool {
    let attempts = policy.max_retries + 1;
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            warn!("Download of {} cancelled", job.display_name);
            return false;
        }

        let error = match downloader.download(job, observer, cancel).await {
            Ok(()) => return true,
            Err(e) => e,
        };
        observer.on_error(job, &error);

        if !error.is_retryable() {
            error!("Download of {} failed: {}", job.display_name, error);
            return false;
        }
        if attempt == attempts {
            error!(
                "Giving up on {} after {} attempts: {}",
                job.display_name, attempts, error
            );
            return false;
        }

        let wait = policy.backoff(attempt);
        warn!(
            "Download of {} failed (attempt {}/{}): {}. Retrying in {}s",
            job.display_name,
            attempt,
            attempts,
            error,
            wait.as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return false,
        }
    }
    false
}
