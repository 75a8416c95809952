// Scan command: normalize the config and record the installed plugins

use super::Workspace;
use crate::config::{Config, ConfigSchema, reconcile_keys, value_as_str};
use crate::constants::{LATEST_SUFFIX, PLUGINS_DIR};
use crate::hash::compute_hashes;
use crate::jar::read_jar_info;
use crate::registry::Registries;
use crate::storage::{ServerFolder, open_server_folder};
use crate::ui;
use crate::update::normalize_update_order;
use log::{debug, info, warn};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Bring the loaded config in line with the registered updaters and open the
/// server folder it points to. The config is saved and reloaded.
pub fn prepare_config(
    config: &mut Config,
    registries: &Registries,
    schema: &ConfigSchema,
    cleanup: bool,
) -> anyhow::Result<ServerFolder> {
    let configured = config
        .get_str("settings.server_folder")
        .map(|f| f.trim().to_string())
        .unwrap_or_default();
    if configured.is_empty() {
        config.save()?;
        anyhow::bail!(
            "No server folder configured. Set settings.server_folder in {}",
            config.path().display()
        );
    }
    let server_folder = if configured.contains("://") {
        configured
    } else {
        let path = PathBuf::from(&configured);
        let absolute = std::path::absolute(&path).unwrap_or(path);
        let absolute = absolute.to_string_lossy().into_owned();
        if absolute != configured {
            debug!("Server folder resolved to {}", absolute);
            config.set("settings.server_folder", absolute.as_str());
        }
        absolute
    };
    let folder = open_server_folder(&server_folder)?;

    let order = normalize_update_order(
        &config.get_str_list("settings.update_order"),
        &registries.plugin.config_paths(),
    );
    config.set("settings.update_order", order);

    for (kind, registry) in [("server", &registries.server), ("plugin", &registries.plugin)] {
        let defaults = Value::Mapping(registry.common_defaults());
        if config.get_mapping_in(&["updater_settings", kind]).is_none() {
            config.set_in(&["updater_settings", kind], Mapping::new());
        }
        if let Some(settings) = config.get_mut_in(&["updater_settings", kind]) {
            reconcile_keys(settings, &defaults, cleanup);
        }
    }

    let server_type = config.get_str("server.type").unwrap_or_default();
    let known = registries.server.server_types();
    if !known.iter().any(|t| t.eq_ignore_ascii_case(&server_type)) {
        warn!(
            "Server type '{}' is not supported, expected one of: {}",
            server_type,
            known.join(", ")
        );
    }

    config.save()?;
    config.reload(schema)?;
    Ok(folder)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Plugins seen for the first time, whose updater settings are still empty
    pub new_plugins: Vec<String>,
    pub renamed: usize,
    /// Stopped between two archives, the remaining ones were not looked at
    pub cancelled: bool,
}

/// Name of the entry already tracking `file_name` with this md5
fn tracked_entry(plugins: Option<&Mapping>, file_name: &str, md5: Option<&str>) -> Option<String> {
    plugins?.iter().find_map(|(name, entry)| {
        let same_file = entry.get("file").and_then(value_as_str).as_deref() == Some(file_name);
        let same_md5 = entry.get("hashes").and_then(|h| h.get("md5")).and_then(value_as_str).as_deref() == md5;
        (same_file && same_md5).then(|| value_as_str(name)).flatten()
    })
}

/// Record every jar in the plugins folder under `plugins.<name>`
pub fn scan_plugins(
    config: &mut Config,
    schema: &ConfigSchema,
    folder: &ServerFolder,
    cache_dir: &Path,
    cleanup: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<ScanOutcome> {
    if !folder.is_dir(PLUGINS_DIR)? {
        anyhow::bail!("No '{}' folder found in the server folder", PLUGINS_DIR);
    }

    let mut outcome = ScanOutcome::default();
    let mut present: HashSet<String> = HashSet::new();

    for file_name in folder.list_jars(PLUGINS_DIR)? {
        if cancel.is_cancelled() {
            info!("Scan cancelled, {} plugins recorded so far", present.len());
            outcome.cancelled = true;
            return Ok(outcome);
        }
        if file_name.ends_with(LATEST_SUFFIX) {
            debug!("Ignoring unfinished download {}", file_name);
            continue;
        }

        let relative = format!("{}/{}", PLUGINS_DIR, file_name);
        let local = folder.fetch(&relative, cache_dir)?;
        let scanned = compute_hashes(&local).and_then(|hashes| {
            if tracked_entry(config.get_mapping_in(&["plugins"]), &file_name, hashes.md5.as_deref())
                .is_some()
            {
                return Ok((hashes, None));
            }
            read_jar_info(&local).map(|info| (hashes, Some(info)))
        });
        if folder.is_remote() {
            if let Err(e) = std::fs::remove_file(&local) {
                debug!("Could not remove cached {}: {}", local.display(), e);
            }
        }

        let (hashes, info) = match scanned {
            Ok(scanned) => scanned,
            Err(e) => {
                warn!("Skipping {}: {:#}", file_name, e);
                continue;
            }
        };
        let Some(info) = info else {
            present.insert(file_name);
            continue;
        };

        let mut final_name = file_name.clone();
        let canonical = info.file_name();
        if canonical != file_name {
            let target = format!("{}/{}", PLUGINS_DIR, canonical);
            if folder.exists(&target)? {
                warn!(
                    "Not renaming {} to {}: a file with that name already exists",
                    file_name, canonical
                );
            } else {
                folder.rename(&relative, &target)?;
                info!("Renamed {} to {}", file_name, canonical);
                outcome.renamed += 1;
                final_name = canonical;
            }
        }

        let name = info.name.as_str();
        if config.get_in(&["plugins", name]).is_none() {
            config.set_in(&["plugins", name], schema.default_plugin().clone());
            outcome.new_plugins.push(info.name.clone());
        }
        config.set_in(&["plugins", name, "file"], final_name.as_str());
        config.set_in(&["plugins", name, "version"], info.version.as_str());
        config.set_in(&["plugins", name, "authors"], info.authors.clone());
        config.set_in(&["plugins", name, "hashes"], hashes.to_value());
        present.insert(final_name);
    }

    if !config.get_bool("settings.keep_removed").unwrap_or(true) {
        let gone: Vec<String> = config
            .get_mapping_in(&["plugins"])
            .into_iter()
            .flatten()
            .filter(|(_, entry)| {
                !entry
                    .get("file")
                    .and_then(value_as_str)
                    .is_some_and(|f| present.contains(&f))
            })
            .filter_map(|(name, _)| value_as_str(name))
            .collect();
        for name in gone {
            info!("Forgetting {}, its jar is gone", name);
            config.remove_in(&["plugins", name.as_str()]);
        }
    }

    let plugins = config
        .get_mapping_in(&["plugins"])
        .cloned()
        .unwrap_or_default();
    let mut sorted: Vec<(Value, Value)> = Vec::with_capacity(plugins.len());
    for (name, mut entry) in plugins {
        reconcile_keys(&mut entry, schema.default_plugin(), cleanup);
        sorted.push((name, entry));
    }
    sorted.sort_by_key(|(name, _)| value_as_str(name).unwrap_or_default().to_lowercase());
    config.set("plugins", Value::Mapping(sorted.into_iter().collect()));

    outcome.new_plugins.sort_by_key(|name| name.to_lowercase());
    Ok(outcome)
}

/// `scan` command
pub fn scan(workspace: &Workspace, cleanup: bool, cancel: &CancellationToken) -> anyhow::Result<ScanOutcome> {
    let mut config = workspace.load_config()?;
    let folder = prepare_config(&mut config, &workspace.registries, &workspace.schema, cleanup)?;

    let pb = ui::spinner("Scanning plugins...");
    let outcome = match scan_plugins(
        &mut config,
        &workspace.schema,
        &folder,
        &workspace.paths.cache_dir(),
        cleanup,
        cancel,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            ui::finish_spinner_error(&pb, "Scan failed");
            return Err(e);
        }
    };
    config.save()?;
    if outcome.cancelled {
        pb.finish_and_clear();
        ui::warning("Scan cancelled, the remaining plugins were not scanned");
        return Ok(outcome);
    }

    let tracked = config
        .get_mapping_in(&["plugins"])
        .map(Mapping::len)
        .unwrap_or(0);
    ui::finish_spinner_success(&pb, &format!("Tracking {} plugins", tracked));
    report_new_plugins(&config, &outcome);
    Ok(outcome)
}

pub fn report_new_plugins(config: &Config, outcome: &ScanOutcome) {
    if outcome.new_plugins.is_empty() {
        return;
    }
    ui::warning(&format!(
        "New plugins found: {}",
        outcome.new_plugins.join(", ")
    ));
    ui::action(&format!(
        "Fill in their updater settings in {} and run again",
        config.path().display()
    ));
}
