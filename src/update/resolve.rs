// Resolution engine: try candidate updaters in order, download the first hit

use crate::constants::LATEST_SUFFIX;
use crate::download::{DownloadJob, DownloadObserver, Downloader, RetryPolicy, managed_download};
use crate::hash::{Hashes, compute_hashes};
use crate::jar;
use crate::updaters::{ResourceIdentity, UpdateContext, Updater, UpdaterConfig};
use anyhow::Result;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An updater together with the settings it gets for one resource
#[derive(Clone)]
pub struct Candidate {
    pub updater: Arc<dyn Updater>,
    pub config: UpdaterConfig,
}

/// A verified new artifact sitting in the staging directory
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpdate {
    pub file_name: String,
    pub staged: PathBuf,
    pub version: Option<String>,
    pub authors: Vec<String>,
    pub hashes: Hashes,
    pub updater_path: &'static str,
    pub delta: UpdaterConfig,
}

struct Fetched {
    updater_path: &'static str,
    delta: UpdaterConfig,
}

/// Hashes to compare remote artifacts against.
///
/// A missing artifact gets placeholder hashes so every comparison reports a
/// difference. Recorded hashes are trusted; otherwise they are computed from
/// `local` when a local copy is at hand.
pub fn current_hashes(exists: bool, local: Option<&Path>, persisted: Hashes) -> Hashes {
    if !exists {
        return Hashes::impossible();
    }
    if persisted.is_known() {
        return persisted;
    }
    match local.map(compute_hashes) {
        Some(Ok(hashes)) => hashes,
        Some(Err(e)) => {
            warn!("Could not hash installed file: {}", e);
            Hashes::impossible()
        }
        None => Hashes::impossible(),
    }
}

pub struct UpdateEngine {
    downloader: Arc<dyn Downloader>,
    observer: Arc<dyn DownloadObserver>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    ctx: UpdateContext,
}

impl UpdateEngine {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        observer: Arc<dyn DownloadObserver>,
        policy: RetryPolicy,
        cancel: CancellationToken,
        ctx: UpdateContext,
    ) -> Self {
        Self {
            downloader,
            observer,
            policy,
            cancel,
            ctx,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve a plugin. The new jar ends up in `staging_dir` under its canonical name.
    pub async fn resolve_plugin(
        &self,
        identity: ResourceIdentity,
        candidates: &[Candidate],
        staging_dir: &Path,
    ) -> Result<Option<ResolvedUpdate>> {
        let staged = staging_dir.join(format!("{} {}", identity.name, LATEST_SUFFIX));
        let Some(fetched) = self.fetch(&identity, candidates, &staged).await? else {
            return Ok(None);
        };

        let inspected = compute_hashes(&staged)
            .and_then(|hashes| jar::read_jar_info(&staged).map(|info| (hashes, info)));
        let (hashes, info) = match inspected {
            Ok(found) => found,
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        };
        let renamed = jar::rename_jar(&staged, &info)?;
        info!(
            "{}: downloaded version {} via {}",
            identity.name, info.version, fetched.updater_path
        );

        Ok(Some(ResolvedUpdate {
            file_name: info.file_name(),
            staged: renamed,
            version: Some(info.version),
            authors: info.authors,
            hashes,
            updater_path: fetched.updater_path,
            delta: fetched.delta,
        }))
    }

    /// Resolve the server jar. The new jar is staged as `<file_name>.download`.
    pub async fn resolve_server(
        &self,
        identity: ResourceIdentity,
        candidates: &[Candidate],
        staging_dir: &Path,
        file_name: &str,
    ) -> Result<Option<ResolvedUpdate>> {
        let staged = staging_dir.join(format!("{}.download", file_name));
        let Some(fetched) = self.fetch(&identity, candidates, &staged).await? else {
            return Ok(None);
        };

        let hashes = match compute_hashes(&staged) {
            Ok(hashes) => hashes,
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        };
        Ok(Some(ResolvedUpdate {
            file_name: file_name.to_string(),
            staged,
            version: identity.version,
            authors: Vec::new(),
            hashes,
            updater_path: fetched.updater_path,
            delta: fetched.delta,
        }))
    }

    /// First candidate offering a download wins. Updater errors move on to the
    /// next candidate; a failed download ends the resolution.
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
        candidates: &[Candidate],
        staged: &Path,
    ) -> Result<Option<Fetched>> {
        for candidate in candidates {
            if self.cancel.is_cancelled() {
                info!("{}: update cancelled", identity.name);
                return Ok(None);
            }
            let updater = &candidate.updater;

            let mut check =
                match updater.instantiate(identity.clone(), candidate.config.clone(), self.ctx) {
                    Ok(check) => check,
                    Err(e) => {
                        warn!(
                            "{}: {} updater could not be set up: {:#}",
                            identity.name,
                            updater.updater_name(),
                            e
                        );
                        continue;
                    }
                };

            let descriptor = match check.resolve_update().await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    debug!(
                        "{}: no update from {}",
                        identity.name,
                        updater.updater_name()
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "{}: {} updater failed: {:#}",
                        identity.name,
                        updater.updater_name(),
                        e
                    );
                    continue;
                }
            };

            let job = DownloadJob::new(descriptor.url, staged)
                .with_headers(descriptor.headers)
                .with_display_name(identity.name.clone());
            let downloaded = managed_download(
                self.downloader.as_ref(),
                &job,
                self.observer.as_ref(),
                self.policy,
                &self.cancel,
            )
            .await;
            if !downloaded {
                discard(staged);
                if self.cancel.is_cancelled() {
                    info!("{}: download cancelled", identity.name);
                    return Ok(None);
                }
                anyhow::bail!(
                    "Download of {} from {} failed",
                    identity.name,
                    updater.updater_name()
                );
            }

            return Ok(Some(Fetched {
                updater_path: updater.config_path(),
                delta: check.config_delta(),
            }));
        }
        Ok(None)
    }
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::download::tests::NoopObserver;
    use crate::error::DownloadError;
    use crate::jar::tests::plugin_jar;
    use crate::updaters::{DownloadDescriptor, SchemaFragment, UpdateCheck};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves `fake://<name>/<version>` as a plugin jar, anything else fails
    pub(crate) struct JarDownloader;

    #[async_trait]
    impl Downloader for JarDownloader {
        async fn download(
            &self,
            job: &DownloadJob,
            _observer: &dyn DownloadObserver,
            _cancel: &CancellationToken,
        ) -> Result<(), DownloadError> {
            let spec = job
                .url
                .strip_prefix("fake://")
                .ok_or_else(|| DownloadError::Transfer(format!("unreachable {}", job.url)))?;
            let (name, version) = spec.split_once('/').unwrap_or((spec, "1.0"));
            std::fs::write(&job.destination, plugin_jar(name, version))?;
            Ok(())
        }
    }

    /// Answers with a fixed result and counts its calls
    pub(crate) struct FakeUpdater {
        pub(crate) path: &'static str,
        pub(crate) answer: Option<&'static str>,
        pub(crate) fail_for: Option<&'static str>,
        pub(crate) server_types: &'static [&'static str],
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl FakeUpdater {
        pub(crate) fn new(path: &'static str, answer: Option<&'static str>) -> Self {
            Self {
                path,
                answer,
                fail_for: None,
                server_types: &[],
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Updater for FakeUpdater {
        fn updater_name(&self) -> &'static str {
            self.path
        }

        fn config_path(&self) -> &'static str {
            self.path
        }

        fn config_schema(&self) -> SchemaFragment {
            SchemaFragment::default()
        }

        fn server_types(&self) -> &'static [&'static str] {
            self.server_types
        }

        fn instantiate(
            &self,
            resource: ResourceIdentity,
            _config: UpdaterConfig,
            _ctx: UpdateContext,
        ) -> anyhow::Result<Box<dyn UpdateCheck>> {
            Ok(Box::new(FakeCheck {
                resource,
                answer: self.answer,
                fail_for: self.fail_for,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct FakeCheck {
        resource: ResourceIdentity,
        answer: Option<&'static str>,
        fail_for: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UpdateCheck for FakeCheck {
        async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for == Some(self.resource.name.as_str()) {
                anyhow::bail!("remote answered garbage");
            }
            Ok(self.answer.map(|version| {
                DownloadDescriptor::new(format!("fake://{}/{}", self.resource.name, version))
            }))
        }

        fn config_delta(&self) -> UpdaterConfig {
            let mut delta = UpdaterConfig::default();
            if let Some(version) = self.answer {
                delta.set_resource("seen", version);
            }
            delta
        }
    }

    pub(crate) fn engine(downloader: Arc<dyn Downloader>) -> UpdateEngine {
        UpdateEngine::new(
            downloader,
            Arc::new(NoopObserver),
            RetryPolicy::new(0),
            CancellationToken::new(),
            UpdateContext::default(),
        )
    }

    fn candidate(updater: &Arc<FakeUpdater>) -> Candidate {
        Candidate {
            updater: updater.clone(),
            config: UpdaterConfig::default(),
        }
    }

    fn identity(name: &str) -> ResourceIdentity {
        ResourceIdentity {
            name: name.into(),
            version: Some("1.0".into()),
            hashes: Hashes::impossible(),
        }
    }

    #[tokio::test]
    async fn test_first_offering_candidate_wins() {
        let a = Arc::new(FakeUpdater::new("a", None));
        let b = Arc::new(FakeUpdater::new("b", None));
        let c = Arc::new(FakeUpdater::new("c", Some("2.0")));
        let d = Arc::new(FakeUpdater::new("d", Some("3.0")));
        let candidates: Vec<Candidate> = [&a, &b, &c, &d].into_iter().map(candidate).collect();
        let temp_dir = TempDir::new().unwrap();

        let update = engine(Arc::new(JarDownloader))
            .resolve_plugin(identity("Foo"), &candidates, temp_dir.path())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.calls.load(Ordering::SeqCst), 0);

        assert_eq!(update.updater_path, "c");
        assert_eq!(update.file_name, "Foo [2.0].jar");
        assert_eq!(update.staged, temp_dir.path().join("Foo [2.0].jar"));
        assert_eq!(update.version.as_deref(), Some("2.0"));
        assert_eq!(update.delta.resource_str("seen").as_deref(), Some("2.0"));
        assert!(update.hashes.is_known());
        assert!(!temp_dir.path().join("Foo [Latest].jar").exists());
    }

    #[tokio::test]
    async fn test_failing_candidate_falls_through() {
        let mut broken = FakeUpdater::new("broken", Some("9.9"));
        broken.fail_for = Some("Foo");
        let broken = Arc::new(broken);
        let working = Arc::new(FakeUpdater::new("working", Some("2.0")));
        let temp_dir = TempDir::new().unwrap();

        let update = engine(Arc::new(JarDownloader))
            .resolve_plugin(
                identity("Foo"),
                &[candidate(&broken), candidate(&working)],
                temp_dir.path(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.updater_path, "working");
    }

    #[tokio::test]
    async fn test_no_candidate_means_no_update() {
        let a = Arc::new(FakeUpdater::new("a", None));
        let temp_dir = TempDir::new().unwrap();
        let result = engine(Arc::new(JarDownloader))
            .resolve_plugin(identity("Foo"), &[candidate(&a)], temp_dir.path())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failed_download_stops_resolution() {
        struct Unreachable;

        #[async_trait]
        impl Downloader for Unreachable {
            async fn download(
                &self,
                _job: &DownloadJob,
                _observer: &dyn DownloadObserver,
                _cancel: &CancellationToken,
            ) -> Result<(), DownloadError> {
                Err(DownloadError::Transfer("no route".into()))
            }
        }

        let first = Arc::new(FakeUpdater::new("first", Some("2.0")));
        let second = Arc::new(FakeUpdater::new("second", Some("2.0")));
        let temp_dir = TempDir::new().unwrap();

        let result = engine(Arc::new(Unreachable))
            .resolve_plugin(
                identity("Foo"),
                &[candidate(&first), candidate(&second)],
                temp_dir.path(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_download_keeps_file_name() {
        let paper = Arc::new(FakeUpdater::new("papermc", Some("496")));
        let temp_dir = TempDir::new().unwrap();
        let update = engine(Arc::new(JarDownloader))
            .resolve_server(
                identity("paper"),
                &[candidate(&paper)],
                temp_dir.path(),
                "server.jar",
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(update.file_name, "server.jar");
        assert_eq!(update.staged, temp_dir.path().join("server.jar.download"));
        assert!(update.staged.exists());
    }

    #[test]
    fn test_current_hashes() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("Foo.jar");
        std::fs::write(&jar, "abc").unwrap();

        assert_eq!(
            current_hashes(false, Some(&jar), Hashes::default()),
            Hashes::impossible()
        );
        let persisted = Hashes {
            md5: Some("recorded".into()),
            ..Default::default()
        };
        assert_eq!(current_hashes(true, Some(&jar), persisted.clone()), persisted);
        assert_eq!(
            current_hashes(true, Some(&jar), Hashes::default()).md5.as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
    }
}
