// Hangar (PaperMC) plugin updater

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::version::{self, CompareOp};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig,
};
use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_API: &str = "https://hangar.papermc.io/api/v1";
const PLATFORMS: &[&str] = &["paper", "waterfall", "velocity"];
const CHANNELS: &[&str] = &["release", "snapshot", "alpha"];

const RESOURCE_DEFAULT: &str = "\
# Project slug, e.g. Geyser
id:
# paper, waterfall or velocity
platform: paper
# release, snapshot or alpha
channel: release
";

#[derive(Debug, Deserialize)]
struct ProjectVersion {
    name: String,
    #[serde(default)]
    downloads: HashMap<String, serde_json::Value>,
}

/// `release` -> `Release`, the casing Hangar expects for channel names
fn channel_name(channel: &str) -> String {
    let mut chars = channel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct HangarUpdater {
    api: String,
}

impl HangarUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for HangarUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for HangarUpdater {
    fn updater_name(&self) -> &'static str {
        "Hangar"
    }

    fn config_path(&self) -> &'static str {
        "hangar"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new()
                    .optional("id", FieldKind::Str)
                    .required("platform", FieldKind::OneOf(PLATFORMS))
                    .required("channel", FieldKind::OneOf(CHANNELS)),
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
        let platform = config
            .resource_str("platform")
            .unwrap_or_else(|| "paper".to_string())
            .to_ascii_lowercase();
        let channel = config
            .resource_str("channel")
            .unwrap_or_else(|| "release".to_string())
            .to_ascii_lowercase();
        if !PLATFORMS.contains(&platform.as_str()) {
            anyhow::bail!("Unknown Hangar platform '{}'", platform);
        }
        if !CHANNELS.contains(&channel.as_str()) {
            anyhow::bail!("Unknown Hangar channel '{}'", channel);
        }
        Ok(Box::new(HangarCheck {
            api: self.api.clone(),
            project: config.resource_str("id"),
            platform: platform.to_ascii_uppercase(),
            channel: channel_name(&channel),
            resource,
            ctx,
        }))
    }
}

struct HangarCheck {
    api: String,
    resource: ResourceIdentity,
    project: Option<String>,
    platform: String,
    channel: String,
    ctx: UpdateContext,
}

#[async_trait]
impl UpdateCheck for HangarCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(project) = self.project.as_deref() else {
            return Ok(None);
        };

        let latest_url = http::make_url(
            &self.api,
            &["projects", project, "latest"],
            &[("channel", &self.channel)],
        );
        let latest = http::fetch_text(&latest_url, &Headers::new()).await?;

        let details: ProjectVersion = http::fetch_json(
            &http::make_url(&self.api, &["projects", project, "versions", &latest], &[]),
            &Headers::new(),
        )
        .await?;

        if !version::has_new_version(
            self.resource.version.as_deref(),
            &details.name,
            CompareOp::Lt,
            self.ctx.skip_version_check,
        ) {
            return Ok(None);
        }

        if !details.downloads.contains_key(&self.platform) {
            warn!(
                "{}: Hangar version {} has no {} download",
                self.resource.name, details.name, self.platform
            );
            return Ok(None);
        }

        let url = http::make_url(
            &self.api,
            &[
                "projects",
                project,
                "versions",
                &details.name,
                &self.platform,
                "download",
            ],
            &[],
        );
        if !http::is_downloadable(&url, &Headers::new()).await {
            return Ok(None);
        }
        Ok(Some(DownloadDescriptor::new(url)))
    }
}
