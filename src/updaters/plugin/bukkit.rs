// Bukkit (CurseForge servermods API) plugin updater
//
// The API exposes no usable version string, so files are compared by md5.

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig, version,
};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

const DEFAULT_API: &str = "https://api.curseforge.com";

const RESOURCE_DEFAULT: &str = "\
# Project id shown on the dev.bukkit.org project page
project_id:
";

#[derive(Debug, Deserialize)]
struct ServerModFile {
    md5: String,
    #[serde(rename = "dateReleased")]
    date_released: String,
    #[serde(rename = "downloadUrl")]
    download_url: String,
}

/// `/Date(1700000000000)/` -> 1700000000000
fn parse_release_date(raw: &str) -> i64 {
    raw.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

pub struct BukkitUpdater {
    api: String,
}

impl BukkitUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for BukkitUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for BukkitUpdater {
    fn updater_name(&self) -> &'static str {
        "Bukkit"
    }

    fn config_path(&self) -> &'static str {
        "bukkit"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new().optional("project_id", FieldKind::Int),
                RESOURCE_DEFAULT,
            )),
        }
    }

    fn instantiate(
        &self,
        resource: ResourceIdentity,
        config: UpdaterConfig,
        ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(BukkitCheck {
            api: self.api.clone(),
            project_id: config.resource_i64("project_id"),
            resource,
            ctx,
        }))
    }
}

struct BukkitCheck {
    api: String,
    resource: ResourceIdentity,
    project_id: Option<i64>,
    ctx: UpdateContext,
}

#[async_trait]
impl UpdateCheck for BukkitCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(project_id) = self.project_id.map(|id| id.to_string()) else {
            return Ok(None);
        };

        let url = http::make_url(
            &self.api,
            &["servermods", "files"],
            &[("projectIds", &project_id)],
        );
        let files: Vec<ServerModFile> = http::fetch_json(&url, &Headers::new()).await?;
        let Some(latest) = files
            .iter()
            .max_by_key(|f| parse_release_date(&f.date_released))
        else {
            debug!("{}: Bukkit project {} has no files", self.resource.name, project_id);
            return Ok(None);
        };

        if !version::is_different(
            self.resource.hashes.md5.as_deref(),
            &latest.md5,
            self.ctx.skip_version_check,
        ) {
            debug!("{}: newest Bukkit file is already installed", self.resource.name);
            return Ok(None);
        }

        if !http::is_downloadable(&latest.download_url, &Headers::new()).await {
            return Ok(None);
        }
        Ok(Some(DownloadDescriptor::new(latest.download_url.clone())))
    }
}
