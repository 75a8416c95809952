// BungeeCord server updater, built by md-5's Jenkins

use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, UpdateCheck, UpdateContext, Updater,
    UpdaterConfig, jenkins_api, version,
};
use async_trait::async_trait;
use log::debug;
use regex::Regex;

const DEFAULT_JOB: &str = "https://ci.md-5.net/job/BungeeCord";

lazy_static::lazy_static! {
    static ref ARTIFACT: Regex = Regex::new(r"^BungeeCord\.jar$").expect("valid artifact regex");
}

pub struct BungeeUpdater {
    job_url: String,
}

impl BungeeUpdater {
    pub fn new(job_url: &str) -> Self {
        Self {
            job_url: job_url.to_string(),
        }
    }
}

impl Default for BungeeUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_JOB)
    }
}

impl Updater for BungeeUpdater {
    fn updater_name(&self) -> &'static str {
        "BungeeCord"
    }

    fn config_path(&self) -> &'static str {
        "bungee"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment::default()
    }

    fn server_types(&self) -> &'static [&'static str] {
        &["bungee"]
    }

    fn instantiate(
        &self,
        _resource: ResourceIdentity,
        config: UpdaterConfig,
        ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(BungeeCheck {
            job_url: self.job_url.clone(),
            build_number: config.resource_i64("build_number"),
            ctx,
            delta: UpdaterConfig::default(),
        }))
    }
}

struct BungeeCheck {
    job_url: String,
    build_number: Option<i64>,
    ctx: UpdateContext,
    delta: UpdaterConfig,
}

#[async_trait]
impl UpdateCheck for BungeeCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let build = jenkins_api::last_successful_build(&self.job_url).await?;
        if !version::has_newer_build(self.build_number, build, self.ctx.skip_version_check) {
            debug!("BungeeCord build {} is already installed", build);
            return Ok(None);
        }

        let artifacts = jenkins_api::build_artifacts(&self.job_url, build).await?;
        let artifact = jenkins_api::find_artifact(&artifacts, Some(&ARTIFACT))
            .ok_or_else(|| anyhow::anyhow!("BungeeCord build {} has no BungeeCord.jar", build))?;
        let url = jenkins_api::artifact_url(&self.job_url, build, artifact);

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
