// GitHub Releases plugin updater

use crate::config::{FieldKind, MapSchema};
use crate::updaters::github_api::{self, DEFAULT_API};
use crate::updaters::http::{self, Headers};
use crate::updaters::version::{self, CompareOp};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig,
};
use async_trait::async_trait;
use log::debug;
use regex::Regex;

const COMPARE_TO: &[&str] = &["commit", "tags", "release_name", "file_name"];

const COMMON_DEFAULT: &str = "\
# Personal access token, raises the API rate limit
token:
";

const RESOURCE_DEFAULT: &str = "\
# owner/repository
repo:
# Regex picking the release asset, defaults to the first .jar
name_regex:
prerelease: false
# Commit of the installed release, filled in automatically
commit:
# What decides that a release is newer: commit, tags, release_name or file_name
compare_to: tags
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareTo {
    Commit,
    Tags,
    ReleaseName,
    FileName,
}

impl CompareTo {
    fn parse(value: Option<&str>) -> anyhow::Result<Self> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("tags") => Ok(CompareTo::Tags),
            Some("commit") => Ok(CompareTo::Commit),
            Some("release_name") => Ok(CompareTo::ReleaseName),
            Some("file_name") => Ok(CompareTo::FileName),
            Some(other) => anyhow::bail!(
                "Unknown compare_to '{}', expected one of: {}",
                other,
                COMPARE_TO.join(", ")
            ),
        }
    }
}

pub struct GithubUpdater {
    api: String,
}

impl GithubUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for GithubUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for GithubUpdater {
    fn updater_name(&self) -> &'static str {
        "GitHub"
    }

    fn config_path(&self) -> &'static str {
        "github"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: Some(SettingsFragment::new(
                MapSchema::new().optional("token", FieldKind::Str),
                COMMON_DEFAULT,
            )),
            resource: Some(SettingsFragment::new(
                MapSchema::new()
                    .optional("repo", FieldKind::Str)
                    .optional("name_regex", FieldKind::Str)
                    .required("prerelease", FieldKind::Bool)
                    .optional("commit", FieldKind::Str)
                    .required("compare_to", FieldKind::OneOf(COMPARE_TO)),
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
        let headers = github_api::auth_headers(config.common_str("token").as_deref());
        Ok(Box::new(GithubCheck {
            api: self.api.clone(),
            repo: config.resource_str("repo"),
            name_regex: crate::updaters::name_regex(&config)?,
            prerelease: config.resource_bool("prerelease").unwrap_or(false),
            commit: config.resource_str("commit"),
            compare_to: CompareTo::parse(config.resource_str("compare_to").as_deref())?,
            resource,
            headers,
            ctx,
            delta: UpdaterConfig::default(),
        }))
    }
}

struct GithubCheck {
    api: String,
    resource: ResourceIdentity,
    repo: Option<String>,
    name_regex: Option<Regex>,
    prerelease: bool,
    commit: Option<String>,
    compare_to: CompareTo,
    headers: Headers,
    ctx: UpdateContext,
    delta: UpdaterConfig,
}

#[async_trait]
impl UpdateCheck for GithubCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(repo) = self.repo.as_deref() else {
            return Ok(None);
        };

        let releases = github_api::list_releases(&self.api, repo, &self.headers).await?;
        let Some(release) = github_api::latest_release(&releases, self.prerelease) else {
            debug!("{}: no matching release in {}", self.resource.name, repo);
            return Ok(None);
        };

        let asset = release
            .assets
            .iter()
            .find(|a| crate::updaters::matches_file(self.name_regex.as_ref(), &a.name))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No asset of release '{}' in '{}' matches the name regex",
                    release.tag_name,
                    repo
                )
            })?;

        let commit =
            github_api::tag_commit(&self.api, repo, &release.tag_name, &self.headers).await?;

        let local = self.resource.version.as_deref();
        let skip = self.ctx.skip_version_check;
        let newer = match self.compare_to {
            CompareTo::Commit => version::is_different(self.commit.as_deref(), &commit, skip),
            CompareTo::Tags => {
                version::has_new_version(local, &release.tag_name, CompareOp::Lt, skip)
            }
            CompareTo::ReleaseName => version::has_new_version(
                local,
                release.name.as_deref().unwrap_or(&release.tag_name),
                CompareOp::Lt,
                skip,
            ),
            CompareTo::FileName => {
                version::has_new_version(local, &asset.name, CompareOp::Lt, skip)
            }
        };
        if !newer {
            debug!(
                "{}: release {} is not newer than {}",
                self.resource.name,
                release.tag_name,
                local.unwrap_or("unknown")
            );
            return Ok(None);
        }

        if !http::is_downloadable(&asset.browser_download_url, &self.headers).await {
            return Ok(None);
        }

        self.delta.set_resource("commit", commit);
        Ok(Some(
            DownloadDescriptor::new(asset.browser_download_url.clone())
                .with_headers(self.headers.clone()),
        ))
    }

    fn config_delta(&self) -> UpdaterConfig {
        self.delta.clone()
    }
}
