// Update orchestration for the server jar and all tracked plugins
//
// Plugins resolve concurrently on a bounded set of tasks. Results are collected
// once every task settled and applied to the config one by one, in submission
// order, on the calling task.

pub mod reconcile;
pub mod resolve;

pub use resolve::{Candidate, ResolvedUpdate, UpdateEngine, current_hashes};

use crate::config::{Config, value_as_bool, value_as_str};
use crate::constants::{DEFAULT_PARALLEL_DOWNLOADS, PLUGINS_DIR};
use crate::hash::Hashes;
use crate::registry::Registry;
use crate::storage::ServerFolder;
use crate::updaters::{ResourceIdentity, Updater, UpdaterConfig};
use anyhow::Result;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    pub parallel_downloads: usize,
    /// Also update plugins whose jar is missing from the server folder
    pub force_leftover_update: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            parallel_downloads: DEFAULT_PARALLEL_DOWNLOADS,
            force_leftover_update: false,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: Vec<String>,
    pub failed: Vec<String>,
}

/// Configured order filtered to registered updaters, then the unlisted ones
pub fn normalize_update_order(configured: &[String], registered: &[&str]) -> Vec<String> {
    let mut order: Vec<String> = Vec::with_capacity(registered.len());
    for name in configured {
        if registered.contains(&name.as_str()) && !order.contains(name) {
            order.push(name.clone());
        }
    }
    for name in registered {
        if !order.iter().any(|o| o == name) {
            order.push(name.to_string());
        }
    }
    order
}

/// Plugin updaters in the order `settings.update_order` asks for
pub fn ordered_plugin_updaters(config: &Config, registry: &Registry) -> Vec<Arc<dyn Updater>> {
    let configured = config.get_str_list("settings.update_order");
    normalize_update_order(&configured, &registry.config_paths())
        .iter()
        .filter_map(|path| registry.backend_for(path))
        .collect()
}

fn mapping_at(config: &Config, keys: &[&str]) -> Mapping {
    config.get_mapping_in(keys).cloned().unwrap_or_default()
}

fn plugin_candidates(
    config: &Config,
    updaters: &[Arc<dyn Updater>],
    entry: &Value,
) -> Vec<Candidate> {
    updaters
        .iter()
        .map(|updater| {
            let path = updater.config_path();
            let resource = entry
                .get(path)
                .and_then(Value::as_mapping)
                .cloned()
                .unwrap_or_default();
            Candidate {
                updater: Arc::clone(updater),
                config: UpdaterConfig::new(
                    mapping_at(config, &["updater_settings", "plugin", path]),
                    resource,
                ),
            }
        })
        .collect()
}

struct PluginTask {
    name: String,
    old_file: Option<String>,
    handle: JoinHandle<Result<Option<ResolvedUpdate>>>,
}

pub async fn update_plugins(
    config: &mut Config,
    registry: &Registry,
    folder: &ServerFolder,
    engine: Arc<UpdateEngine>,
    cache_dir: &Path,
    options: UpdateOptions,
) -> Result<UpdateSummary> {
    let updaters = ordered_plugin_updaters(config, registry);
    let staging_dir = folder.staging_dir(PLUGINS_DIR, cache_dir);
    std::fs::create_dir_all(&staging_dir)?;

    let plugins: Vec<(String, Value)> = config
        .get_mapping_in(&["plugins"])
        .map(|plugins| {
            plugins
                .iter()
                .filter_map(|(name, entry)| Some((value_as_str(name)?, entry.clone())))
                .collect()
        })
        .unwrap_or_default();

    let semaphore = Arc::new(Semaphore::new(options.parallel_downloads.max(1)));
    let mut tasks = Vec::new();

    for (name, entry) in plugins {
        if engine.cancel_token().is_cancelled() {
            warn!("Update cancelled, not starting the remaining plugins");
            break;
        }
        if entry.get("exclude").and_then(value_as_bool).unwrap_or(false) {
            debug!("{}: excluded from updates", name);
            continue;
        }

        let old_file = entry
            .get("file")
            .and_then(value_as_str)
            .filter(|file| !file.trim().is_empty())
            .map(|file| format!("{}/{}", PLUGINS_DIR, file));
        let exists = match &old_file {
            Some(relative) => folder.exists(relative).unwrap_or_else(|e| {
                warn!("{}: could not check {}: {}", name, relative, e);
                false
            }),
            None => false,
        };
        if !exists && !options.force_leftover_update {
            debug!("{}: jar is missing, skipping", name);
            continue;
        }

        let local = old_file.as_deref().and_then(|f| folder.local_file(f));
        let identity = ResourceIdentity {
            name: name.clone(),
            version: entry.get("version").and_then(value_as_str),
            hashes: current_hashes(
                exists,
                local.as_deref(),
                Hashes::from_value(entry.get("hashes")),
            ),
        };
        let candidates = plugin_candidates(config, &updaters, &entry);

        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let staging_dir = staging_dir.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            if engine.cancel_token().is_cancelled() {
                debug!("{}: cancelled before it started", identity.name);
                return Ok(None);
            }
            engine
                .resolve_plugin(identity, &candidates, &staging_dir)
                .await
        });
        tasks.push(PluginTask {
            name,
            old_file,
            handle,
        });
    }

    let (resources, handles): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .map(|task| ((task.name, task.old_file), task.handle))
        .unzip();
    let outcomes = join_all(handles).await;

    let mut summary = UpdateSummary::default();
    for ((name, old_file), outcome) in resources.into_iter().zip(outcomes) {
        let update = match outcome {
            Ok(Ok(Some(update))) => update,
            Ok(Ok(None)) => continue,
            Ok(Err(e)) => {
                error!("{}: {:#}", name, e);
                summary.failed.push(name);
                continue;
            }
            Err(e) => {
                error!("{}: update task aborted: {}", name, e);
                summary.failed.push(name);
                continue;
            }
        };

        let new_file = format!("{}/{}", PLUGINS_DIR, update.file_name);
        if let Err(e) = folder.install(&update.staged, &new_file) {
            error!("{}: could not install {}: {:#}", name, update.file_name, e);
            summary.failed.push(name);
            continue;
        }
        reconcile::apply_plugin_update(config, &name, &update);
        if let Some(old_file) = old_file {
            folder.remove_replaced(&old_file, &new_file);
        }
        info!(
            "{}: updated to {}",
            name,
            update.version.as_deref().unwrap_or("unknown version")
        );
        summary.updated.push(name);
    }
    Ok(summary)
}

/// Update the server jar. Returns whether a new jar was installed.
pub async fn update_server(
    config: &mut Config,
    registry: &Registry,
    folder: &ServerFolder,
    engine: &UpdateEngine,
    cache_dir: &Path,
) -> Result<bool> {
    let server_type = config.get_str("server.type").unwrap_or_default();
    let file = config
        .get_str("server.file")
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| "server.jar".to_string());

    let updaters = registry.backends_for(&server_type);
    if updaters.is_empty() {
        warn!("No updater supports server type '{}'", server_type);
        return Ok(false);
    }

    let exists = folder.exists(&file)?;
    let local = folder.local_file(&file);
    let identity = ResourceIdentity {
        name: server_type.clone(),
        version: config.get_str("server.version"),
        hashes: current_hashes(
            exists,
            local.as_deref(),
            Hashes::from_value(config.get("server.hashes")),
        ),
    };

    let mut resource = Mapping::new();
    for key in ["build_number", "custom_url"] {
        if let Some(value) = config.get_in(&["server", key]) {
            resource.insert(Value::from(key), value.clone());
        }
    }
    let candidates: Vec<Candidate> = updaters
        .into_iter()
        .map(|updater| Candidate {
            config: UpdaterConfig::new(
                mapping_at(config, &["updater_settings", "server", updater.config_path()]),
                resource.clone(),
            ),
            updater,
        })
        .collect();

    let staging_dir = folder.staging_dir("", cache_dir);
    std::fs::create_dir_all(&staging_dir)?;

    match engine
        .resolve_server(identity, &candidates, &staging_dir, &file)
        .await
    {
        Ok(Some(update)) => {
            folder.install(&update.staged, &file)?;
            reconcile::apply_server_update(config, &update);
            info!("Server {} updated via {}", server_type, update.updater_path);
            Ok(true)
        }
        Ok(None) => {
            info!("Server {} is up to date", server_type);
            Ok(false)
        }
        Err(e) => {
            error!("Server update failed: {:#}", e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::NoopObserver;
    use crate::download::{DownloadJob, DownloadObserver, Downloader, HttpDownloader, RetryPolicy};
    use crate::error::DownloadError;
    use crate::jar::tests::plugin_jar;
    use crate::storage::open_server_folder;
    use crate::updaters::UpdateContext;
    use crate::updaters::plugin::GithubUpdater;
    use mockito::{Matcher, Server};
    use resolve::tests::{FakeUpdater, JarDownloader, engine};
    use std::fs;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn server_dir(plugins: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("plugins")).unwrap();
        for file in plugins {
            fs::write(temp_dir.path().join("plugins").join(file), "old jar").unwrap();
        }
        temp_dir
    }

    fn config_with(yaml: &str) -> Config {
        Config::from_value("config.yaml", serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_normalize_update_order() {
        let order = normalize_update_order(
            &["spigot".into(), "unknown".into(), "github".into(), "spigot".into()],
            &["github", "jenkins", "spigot"],
        );
        assert_eq!(order, vec!["spigot", "github", "jenkins"]);
        assert_eq!(
            normalize_update_order(&[], &["github", "jenkins"]),
            vec!["github", "jenkins"]
        );
    }

    #[tokio::test]
    async fn test_one_failing_plugin_does_not_affect_others() {
        let server = server_dir(&["P1.jar", "P2.jar", "P3.jar", "P4.jar", "P5.jar"]);
        let mut fake = FakeUpdater::new("fake", Some("2.0"));
        fake.fail_for = Some("P3");
        let mut registry = Registry::new();
        assert!(registry.register(Arc::new(fake)));

        let mut yaml = String::from("settings:\n  update_order: [fake]\nplugins:\n");
        for i in 1..=5 {
            yaml.push_str(&format!(
                "  P{i}:\n    exclude: false\n    file: P{i}.jar\n    version: '1.0'\n"
            ));
        }
        let mut config = config_with(&yaml);
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();

        let summary = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine(Arc::new(JarDownloader))),
            Path::new("unused-cache"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.updated, vec!["P1", "P2", "P4", "P5"]);
        for name in ["P1", "P2", "P4", "P5"] {
            assert_eq!(
                config.get_in(&["plugins", name, "version"]),
                Some(&Value::from("2.0"))
            );
            assert!(server.path().join(format!("plugins/{} [2.0].jar", name)).exists());
            assert!(!server.path().join(format!("plugins/{}.jar", name)).exists());
        }
        assert_eq!(
            config.get_in(&["plugins", "P3", "version"]),
            Some(&Value::from("1.0"))
        );
        assert!(server.path().join("plugins/P3.jar").exists());
    }

    #[tokio::test]
    async fn test_excluded_and_missing_plugins_are_skipped() {
        let server = server_dir(&["Kept.jar"]);
        let fake = FakeUpdater::new("fake", Some("2.0"));
        let calls = Arc::clone(&fake.calls);
        let mut registry = Registry::new();
        registry.register(Arc::new(fake));
        let mut config = config_with(
            "plugins:\n  Kept:\n    exclude: true\n    file: Kept.jar\n  Gone:\n    exclude: false\n    file: Gone.jar\n",
        );
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();

        let summary = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine(Arc::new(JarDownloader))),
            Path::new("unused-cache"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(summary, UpdateSummary::default());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let leftover = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine(Arc::new(JarDownloader))),
            Path::new("unused-cache"),
            UpdateOptions {
                force_leftover_update: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(leftover.updated, vec!["Gone"]);
        assert!(server.path().join("plugins/Gone [2.0].jar").exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let server = server_dir(&["P1.jar"]);
        let fake = FakeUpdater::new("fake", Some("2.0"));
        let calls = Arc::clone(&fake.calls);
        let mut registry = Registry::new();
        registry.register(Arc::new(fake));
        let mut config = config_with("plugins:\n  P1:\n    exclude: false\n    file: P1.jar\n");
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();

        let engine = engine(Arc::new(JarDownloader));
        engine.cancel_token().cancel();
        let summary = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine),
            Path::new("unused-cache"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

        assert!(summary.updated.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    /// Cancels the run once the first download went through
    struct CancelAfterFirst(CancellationToken);

    #[async_trait::async_trait]
    impl Downloader for CancelAfterFirst {
        async fn download(
            &self,
            job: &DownloadJob,
            observer: &dyn DownloadObserver,
            cancel: &CancellationToken,
        ) -> Result<(), DownloadError> {
            JarDownloader.download(job, observer, cancel).await?;
            self.0.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queued_plugins_are_skipped_not_failed_on_cancel() {
        let server = server_dir(&["P1.jar", "P2.jar", "P3.jar"]);
        let fake = FakeUpdater::new("fake", Some("2.0"));
        let calls = Arc::clone(&fake.calls);
        let mut registry = Registry::new();
        registry.register(Arc::new(fake));
        let mut config = config_with(
            "plugins:\n  P1:\n    exclude: false\n    file: P1.jar\n  P2:\n    exclude: false\n    file: P2.jar\n  P3:\n    exclude: false\n    file: P3.jar\n",
        );
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();

        let cancel = CancellationToken::new();
        let engine = UpdateEngine::new(
            Arc::new(CancelAfterFirst(cancel.clone())),
            Arc::new(NoopObserver),
            RetryPolicy::new(0),
            cancel,
            UpdateContext::default(),
        );
        let summary = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine),
            Path::new("unused-cache"),
            UpdateOptions {
                parallel_downloads: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.updated, vec!["P1"]);
        assert!(summary.failed.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(server.path().join("plugins/P2.jar").exists());
    }

    #[tokio::test]
    async fn test_server_update_records_build() {
        let server = server_dir(&[]);
        fs::write(server.path().join("server.jar"), "old server").unwrap();
        let mut paper = FakeUpdater::new("papermc", Some("496"));
        paper.server_types = &["paper"];
        let mut registry = Registry::new();
        registry.register(Arc::new(paper));
        let mut config = config_with(
            "server:\n  enable: true\n  file: server.jar\n  type: paper\n  version: '1.20.4'\n  build_number: 490\n",
        );
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();

        let cache = TempDir::new().unwrap();
        let updated = update_server(
            &mut config,
            &registry,
            &folder,
            &engine(Arc::new(JarDownloader)),
            cache.path(),
        )
        .await
        .unwrap();

        assert!(updated);
        assert_ne!(fs::read(server.path().join("server.jar")).unwrap(), b"old server");
        assert!(!server.path().join("server.jar.download").exists());
        assert_eq!(config.get_str("server.seen").as_deref(), Some("496"));
        assert!(config.get_str("server.hashes.sha256").is_some());
    }

    #[tokio::test]
    async fn test_github_release_replaces_installed_plugin() {
        let mut api = Server::new_async().await;
        let asset_url = format!("{}/download/Essentials.jar", api.url());
        let _releases = api
            .mock("GET", "/repos/EssentialsX/Essentials/releases")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"[{{"tag_name":"2.1","name":"2.1","draft":false,"prerelease":false,
                     "created_at":"2024-05-01T00:00:00Z",
                     "assets":[{{"name":"EssentialsX-2.1.jar","browser_download_url":"{}"}}]}}]"#,
                asset_url
            ))
            .create_async()
            .await;
        let _tag = api
            .mock("GET", "/repos/EssentialsX/Essentials/git/ref/tags/2.1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"object":{"sha":"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb","type":"commit"}}"#)
            .create_async()
            .await;
        let _head = api
            .mock("HEAD", "/download/Essentials.jar")
            .with_status(200)
            .with_header("content-type", "application/java-archive")
            .create_async()
            .await;
        let download = api
            .mock("GET", "/download/Essentials.jar")
            .with_status(200)
            .with_header("content-type", "application/java-archive")
            .with_body(plugin_jar("Essentials", "2.1"))
            .create_async()
            .await;

        let server = server_dir(&["Essentials [2.0].jar"]);
        let mut registry = Registry::new();
        assert!(registry.register(Arc::new(GithubUpdater::new(&api.url()))));
        let mut config = config_with(
            r#"
settings:
  update_order: [github]
plugins:
  Essentials:
    exclude: false
    file: Essentials [2.0].jar
    version: "2.0"
    hashes:
      md5: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
      sha1: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
      sha256: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
      sha512: aaaa
    github:
      repo: EssentialsX/Essentials
"#,
        );
        let folder = open_server_folder(server.path().to_str().unwrap()).unwrap();
        let engine = UpdateEngine::new(
            Arc::new(HttpDownloader),
            Arc::new(NoopObserver),
            RetryPolicy::new(0),
            CancellationToken::new(),
            UpdateContext::default(),
        );

        let summary = update_plugins(
            &mut config,
            &registry,
            &folder,
            Arc::new(engine),
            Path::new("unused-cache"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
        download.assert_async().await;

        assert_eq!(summary.updated, vec!["Essentials"]);
        let plugins = server.path().join("plugins");
        assert!(plugins.join("Essentials [2.1].jar").exists());
        assert!(!plugins.join("Essentials [2.0].jar").exists());
        assert!(!plugins.join("Essentials [Latest].jar").exists());

        let expected = crate::hash::compute_hashes(&plugins.join("Essentials [2.1].jar")).unwrap();
        assert_eq!(
            config.get_str("plugins.Essentials.file").as_deref(),
            Some("Essentials [2.1].jar")
        );
        assert_eq!(config.get_str("plugins.Essentials.version").as_deref(), Some("2.1"));
        assert_eq!(config.get_str("plugins.Essentials.hashes.md5"), expected.md5);
        assert_eq!(config.get_str("plugins.Essentials.hashes.sha1"), expected.sha1);
        assert_eq!(config.get_str("plugins.Essentials.hashes.sha256"), expected.sha256);
        assert_eq!(config.get_str("plugins.Essentials.hashes.sha512"), expected.sha512);
        assert_eq!(
            config.get_str("plugins.Essentials.github.commit").as_deref(),
            Some("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
        );
    }
}
