// Modrinth plugin updater

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::version::{self, CompareOp};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig,
};
use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;

const DEFAULT_API: &str = "https://api.modrinth.com/v2";
const VERSION_TYPES: &[&str] = &["release", "beta", "alpha"];

const RESOURCE_DEFAULT: &str = "\
# Project id or slug
id:
# Regex picking the file, defaults to the primary file
name_regex:
# A loader or a list of loaders, e.g. [paper, folia]
loaders:
# A game version or a list of game versions
game_versions:
# release, beta or alpha
version_type: release
";

#[derive(Debug, Deserialize)]
struct Version {
    version_number: String,
    version_type: String,
    date_published: String,
    files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    filename: String,
    url: String,
    #[serde(default)]
    primary: bool,
}

pub struct ModrinthUpdater {
    api: String,
}

impl ModrinthUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for ModrinthUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for ModrinthUpdater {
    fn updater_name(&self) -> &'static str {
        "Modrinth"
    }

    fn config_path(&self) -> &'static str {
        "modrinth"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new()
                    .optional("id", FieldKind::Str)
                    .optional("name_regex", FieldKind::Str)
                    .optional("loaders", FieldKind::StrList)
                    .optional("game_versions", FieldKind::StrList)
                    .required("version_type", FieldKind::OneOf(VERSION_TYPES)),
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
        let version_type = config
            .resource_str("version_type")
            .unwrap_or_else(|| "release".to_string())
            .to_ascii_lowercase();
        if !VERSION_TYPES.contains(&version_type.as_str()) {
            anyhow::bail!("Unknown Modrinth version_type '{}'", version_type);
        }
        Ok(Box::new(ModrinthCheck {
            api: self.api.clone(),
            project: config.resource_str("id"),
            name_regex: crate::updaters::name_regex(&config)?,
            loaders: config.resource_list("loaders"),
            game_versions: config.resource_list("game_versions"),
            version_type,
            resource,
            ctx,
        }))
    }
}

struct ModrinthCheck {
    api: String,
    resource: ResourceIdentity,
    project: Option<String>,
    name_regex: Option<Regex>,
    loaders: Vec<String>,
    game_versions: Vec<String>,
    version_type: String,
    ctx: UpdateContext,
}

impl ModrinthCheck {
    fn versions_url(&self, project: &str) -> anyhow::Result<String> {
        let loaders = serde_json::to_string(&self.loaders)?;
        let game_versions = serde_json::to_string(&self.game_versions)?;
        let mut query = Vec::new();
        if !self.loaders.is_empty() {
            query.push(("loaders", loaders.as_str()));
        }
        if !self.game_versions.is_empty() {
            query.push(("game_versions", game_versions.as_str()));
        }
        Ok(http::make_url(
            &self.api,
            &["project", project, "version"],
            &query,
        ))
    }

    fn pick_file<'a>(&self, files: &'a [VersionFile]) -> Option<&'a VersionFile> {
        match &self.name_regex {
            Some(regex) => files.iter().find(|f| regex.is_match(&f.filename)),
            None => files.iter().find(|f| f.primary).or_else(|| files.first()),
        }
    }
}

#[async_trait]
impl UpdateCheck for ModrinthCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(project) = self.project.as_deref() else {
            return Ok(None);
        };

        let url = self.versions_url(project)?;
        let versions: Vec<Version> = http::fetch_json(&url, &Headers::new()).await?;
        let Some(latest) = versions
            .iter()
            .filter(|v| v.version_type == self.version_type)
            .max_by(|a, b| a.date_published.cmp(&b.date_published))
        else {
            debug!(
                "{}: no {} version on Modrinth for {}",
                self.resource.name, self.version_type, project
            );
            return Ok(None);
        };

        if !version::has_new_version(
            self.resource.version.as_deref(),
            &latest.version_number,
            CompareOp::Lt,
            self.ctx.skip_version_check,
        ) {
            return Ok(None);
        }

        let file = self.pick_file(&latest.files).ok_or_else(|| {
            anyhow::anyhow!(
                "No file of version {} matches the name regex",
                latest.version_number
            )
        })?;

        if !http::is_downloadable(&file.url, &Headers::new()).await {
            return Ok(None);
        }
        Ok(Some(DownloadDescriptor::new(file.url.clone())))
    }
}
