// Jenkins CI plugin updater

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig, jenkins_api, version,
};
use async_trait::async_trait;
use log::debug;
use regex::Regex;

const RESOURCE_DEFAULT: &str = "\
# Job URL, e.g. https://ci.example.org/job/MyPlugin
url:
# Regex picking the artifact, defaults to the first .jar
name_regex:
# Build of the installed jar, filled in automatically
build_number:
";

#[derive(Default)]
pub struct JenkinsUpdater;

impl Updater for JenkinsUpdater {
    fn updater_name(&self) -> &'static str {
        "Jenkins"
    }

    fn config_path(&self) -> &'static str {
        "jenkins"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new()
                    .optional("url", FieldKind::Url)
                    .optional("name_regex", FieldKind::Str)
                    .optional("build_number", FieldKind::Int),
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
        Ok(Box::new(JenkinsCheck {
            job_url: config.resource_str("url"),
            name_regex: crate::updaters::name_regex(&config)?,
            build_number: config.resource_i64("build_number"),
            resource,
            ctx,
            delta: UpdaterConfig::default(),
        }))
    }
}

struct JenkinsCheck {
    resource: ResourceIdentity,
    job_url: Option<String>,
    name_regex: Option<Regex>,
    build_number: Option<i64>,
    ctx: UpdateContext,
    delta: UpdaterConfig,
}

#[async_trait]
impl UpdateCheck for JenkinsCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(job_url) = self.job_url.as_deref() else {
            return Ok(None);
        };

        let build = jenkins_api::last_successful_build(job_url).await?;
        if !version::has_newer_build(self.build_number, build, self.ctx.skip_version_check) {
            debug!(
                "{}: build {} is already installed",
                self.resource.name, build
            );
            return Ok(None);
        }

        let artifacts = jenkins_api::build_artifacts(job_url, build).await?;
        let artifact = jenkins_api::find_artifact(&artifacts, self.name_regex.as_ref())
            .ok_or_else(|| anyhow::anyhow!("No artifact of build {} matches", build))?;
        let url = jenkins_api::artifact_url(job_url, build, artifact);

        if !http::is_downloadable(&url, &Headers::new()).await {
            return Ok(None);
        }

        self.delta.set_resource("build_number", build);
        Ok(Some(DownloadDescriptor::new(url)))
    }

    fn config_delta(&self) -> UpdaterConfig {
        self.delta.clone()
    }
}
