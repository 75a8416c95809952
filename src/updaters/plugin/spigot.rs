// Spigot plugin updater (via Spiget API)

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::version::{self, CompareOp};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig,
};
use async_trait::async_trait;
use log::info;
use serde::Deserialize;

const DEFAULT_API: &str = "https://api.spiget.org/v2";

const RESOURCE_DEFAULT: &str = "\
# Number at the end of the spigotmc.org resource URL
resource_id:
";

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    premium: bool,
}

#[derive(Debug, Deserialize)]
struct LatestVersion {
    name: String,
}

pub struct SpigotUpdater {
    api: String,
}

impl SpigotUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for SpigotUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for SpigotUpdater {
    fn updater_name(&self) -> &'static str {
        "Spigot"
    }

    fn config_path(&self) -> &'static str {
        "spigot"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new().optional("resource_id", FieldKind::Int),
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
        Ok(Box::new(SpigotCheck {
            api: self.api.clone(),
            resource_id: config.resource_i64("resource_id"),
            resource,
            ctx,
        }))
    }
}

struct SpigotCheck {
    api: String,
    resource: ResourceIdentity,
    resource_id: Option<i64>,
    ctx: UpdateContext,
}

#[async_trait]
impl UpdateCheck for SpigotCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(id) = self.resource_id.map(|id| id.to_string()) else {
            return Ok(None);
        };

        let details: Resource =
            http::fetch_json(&http::make_url(&self.api, &["resources", &id], &[]), &Headers::new())
                .await?;
        if details.premium {
            info!(
                "{}: Spigot resource {} is premium and cannot be downloaded",
                self.resource.name, id
            );
            return Ok(None);
        }

        let latest: LatestVersion = http::fetch_json(
            &http::make_url(&self.api, &["resources", &id, "versions", "latest"], &[]),
            &Headers::new(),
        )
        .await?;
        if !version::has_new_version(
            self.resource.version.as_deref(),
            &latest.name,
            CompareOp::Lt,
            self.ctx.skip_version_check,
        ) {
            return Ok(None);
        }

        let url = http::make_url(&self.api, &["resources", &id, "download"], &[]);
        if !http::is_downloadable(&url, &Headers::new()).await {
            return Ok(None);
        }
        Ok(Some(DownloadDescriptor::new(url)))
    }
}
