// Run command: scan, then update the server and every plugin

use super::Workspace;
use super::scan::{ScanOutcome, prepare_config, report_new_plugins, scan_plugins};
use crate::download::{HttpDownloader, RetryPolicy};
use crate::ui;
use crate::update::{UpdateEngine, UpdateOptions, UpdateSummary, update_plugins, update_server};
use crate::updaters::UpdateContext;
use chrono::{DateTime, Duration, Local};
use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Ignore the cooldown
    pub force: bool,
    /// Drop config keys no registered updater knows about
    pub cleanup: bool,
    pub max_retries: u32,
    pub update: UpdateOptions,
    pub ctx: UpdateContext,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped after the scan so the user can configure the new plugins
    NewPlugins(ScanOutcome),
    CoolingDown,
    Finished {
        server_updated: bool,
        plugins: UpdateSummary,
        cancelled: bool,
    },
}

/// Whether more than `hours` passed since `last_update`. A missing or
/// unreadable timestamp never holds a run back.
pub fn cooldown_elapsed(last_update: Option<&str>, hours: i64, now: DateTime<Local>) -> bool {
    let Some(last_update) = last_update.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    match DateTime::parse_from_rfc3339(last_update) {
        Ok(last) => now.signed_duration_since(last) > Duration::hours(hours),
        Err(e) => {
            debug!("Ignoring unreadable last_update '{}': {}", last_update, e);
            true
        }
    }
}

/// `run` command
pub async fn run(
    workspace: &Workspace,
    options: RunOptions,
    cancel: CancellationToken,
) -> anyhow::Result<RunOutcome> {
    let engine = UpdateEngine::new(
        Arc::new(HttpDownloader),
        Arc::new(ui::DownloadProgress::new()),
        RetryPolicy::new(options.max_retries),
        cancel,
        options.ctx,
    );
    let outcome = run_with_engine(workspace, options, Arc::new(engine)).await?;
    report(&outcome);
    Ok(outcome)
}

pub async fn run_with_engine(
    workspace: &Workspace,
    options: RunOptions,
    engine: Arc<UpdateEngine>,
) -> anyhow::Result<RunOutcome> {
    let mut config = workspace.load_config()?;
    let folder = prepare_config(
        &mut config,
        &workspace.registries,
        &workspace.schema,
        options.cleanup,
    )?;
    let cache_dir = workspace.paths.cache_dir();

    let pb = ui::spinner("Scanning plugins...");
    let scanned = scan_plugins(
        &mut config,
        &workspace.schema,
        &folder,
        &cache_dir,
        options.cleanup,
        engine.cancel_token(),
    );
    let scanned = match scanned {
        Ok(scanned) => {
            pb.finish_and_clear();
            scanned
        }
        Err(e) => {
            ui::finish_spinner_error(&pb, "Scan failed");
            return Err(e);
        }
    };
    config.save()?;
    if scanned.cancelled {
        return Ok(RunOutcome::Finished {
            server_updated: false,
            plugins: UpdateSummary::default(),
            cancelled: true,
        });
    }
    if !scanned.new_plugins.is_empty() {
        report_new_plugins(&config, &scanned);
        return Ok(RunOutcome::NewPlugins(scanned));
    }

    let cooldown = config.get_i64("settings.update_cooldown").unwrap_or(0);
    let last_update = config.get_str("last_update");
    if !options.force && !cooldown_elapsed(last_update.as_deref(), cooldown, Local::now()) {
        info!("Last update at {:?}, cooldown is {}h", last_update, cooldown);
        return Ok(RunOutcome::CoolingDown);
    }

    let mut server_updated = false;
    if config.get_bool("server.enable").unwrap_or(false) {
        server_updated = update_server(
            &mut config,
            &workspace.registries.server,
            &folder,
            &engine,
            &cache_dir,
        )
        .await?;
        config.save()?;
    }

    let plugins = update_plugins(
        &mut config,
        &workspace.registries.plugin,
        &folder,
        Arc::clone(&engine),
        &cache_dir,
        options.update,
    )
    .await?;

    let cancelled = engine.cancel_token().is_cancelled();
    if !cancelled {
        config.set("last_update", Local::now().to_rfc3339());
    }
    config.save()?;
    config.reload(&workspace.schema)?;

    Ok(RunOutcome::Finished {
        server_updated,
        plugins,
        cancelled,
    })
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NewPlugins(_) => {}
        RunOutcome::CoolingDown => {
            ui::status("Skipped", "update cooldown has not passed yet, use --force to update anyway");
        }
        RunOutcome::Finished {
            server_updated,
            plugins,
            cancelled,
        } => {
            if *server_updated {
                ui::success("Server updated");
            }
            for name in &plugins.updated {
                ui::success(&format!("{} updated", name));
            }
            for name in &plugins.failed {
                ui::error(&format!("{} failed to update", name));
            }
            if *cancelled {
                ui::warning("Run cancelled, the remaining updates were skipped");
            } else if !*server_updated && plugins.updated.is_empty() && plugins.failed.is_empty() {
                ui::dim("Everything is up to date");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Paths;
    use crate::jar::tests::plugin_jar;
    use crate::update::resolve::tests::{JarDownloader, engine};
    use std::fs;
    use tempfile::TempDir;

    fn options(force: bool) -> RunOptions {
        RunOptions {
            force,
            cleanup: true,
            max_retries: 0,
            update: UpdateOptions::default(),
            ctx: UpdateContext::default(),
        }
    }

    /// Config dir and server folder with one already tracked plugin
    fn workspace(last_update: Option<String>) -> (TempDir, Workspace) {
        let temp_dir = TempDir::new().unwrap();
        let server = temp_dir.path().join("server");
        fs::create_dir_all(server.join("plugins")).unwrap();
        fs::write(
            server.join("plugins/Essentials [2.0].jar"),
            plugin_jar("Essentials", "2.0"),
        )
        .unwrap();

        let workspace =
            Workspace::new(Paths::new(Some(temp_dir.path().join("config")), None)).unwrap();
        let mut config = workspace.load_config().unwrap();
        config.set("settings.server_folder", server.to_string_lossy().into_owned());
        config.set_in(&["plugins", "Essentials"], workspace.schema.default_plugin().clone());
        config.set_in(&["plugins", "Essentials", "file"], "Essentials [2.0].jar");
        if let Some(last_update) = last_update {
            config.set("last_update", last_update);
        }
        config.save().unwrap();
        (temp_dir, workspace)
    }

    #[test]
    fn test_cooldown_elapsed() {
        let now = Local::now();
        let hour_ago = (now - Duration::hours(1)).to_rfc3339();
        let day_ago = (now - Duration::hours(24)).to_rfc3339();

        assert!(!cooldown_elapsed(Some(&hour_ago), 12, now));
        assert!(cooldown_elapsed(Some(&day_ago), 12, now));
        assert!(cooldown_elapsed(Some(&hour_ago), 0, now));
        // Still cooling down at exactly the configured age
        let boundary = (now - Duration::hours(12)).to_rfc3339();
        assert!(!cooldown_elapsed(Some(&boundary), 12, now));
        assert!(cooldown_elapsed(Some(&boundary), 11, now));
        assert!(cooldown_elapsed(None, 12, now));
        assert!(cooldown_elapsed(Some(""), 12, now));
        assert!(cooldown_elapsed(Some("yesterday"), 12, now));
    }

    #[tokio::test]
    async fn test_cooldown_blocks_unforced_run() {
        let last_update = (Local::now() - Duration::hours(1)).to_rfc3339();
        let (_temp_dir, workspace) = workspace(Some(last_update.clone()));
        let engine = Arc::new(engine(Arc::new(JarDownloader)));

        let outcome = run_with_engine(&workspace, options(false), engine)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::CoolingDown);
        let config = workspace.load_config().unwrap();
        assert_eq!(config.get_str("last_update"), Some(last_update));
        assert!(config.get_str("plugins.Essentials.hashes.md5").is_some());
    }

    #[tokio::test]
    async fn test_forced_run_records_last_update() {
        let last_update = (Local::now() - Duration::hours(1)).to_rfc3339();
        let (_temp_dir, workspace) = workspace(Some(last_update.clone()));
        let engine = Arc::new(engine(Arc::new(JarDownloader)));

        let outcome = run_with_engine(&workspace, options(true), engine)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Finished {
                server_updated: false,
                plugins: UpdateSummary::default(),
                cancelled: false,
            }
        );
        let config = workspace.load_config().unwrap();
        assert_ne!(config.get_str("last_update"), Some(last_update));
    }

    #[tokio::test]
    async fn test_new_plugin_stops_the_run() {
        let (temp_dir, workspace) = workspace(None);
        fs::write(
            temp_dir.path().join("server/plugins/vault.jar"),
            plugin_jar("Vault", "1.7"),
        )
        .unwrap();
        let engine = Arc::new(engine(Arc::new(JarDownloader)));

        let outcome = run_with_engine(&workspace, options(true), engine)
            .await
            .unwrap();

        let RunOutcome::NewPlugins(scanned) = outcome else {
            panic!("expected the run to stop after the scan");
        };
        assert_eq!(scanned.new_plugins, vec!["Vault"]);
        let config = workspace.load_config().unwrap();
        assert!(config.get_str("last_update").is_none());
        assert!(config.get("plugins.Vault").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_last_update() {
        let (_temp_dir, workspace) = workspace(None);
        let engine = Arc::new(engine(Arc::new(JarDownloader)));
        engine.cancel_token().cancel();

        let outcome = run_with_engine(&workspace, options(true), engine)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Finished {
                server_updated: false,
                plugins: UpdateSummary::default(),
                cancelled: true,
            }
        );
        let config = workspace.load_config().unwrap();
        assert!(config.get_str("last_update").is_none());
    }
}
