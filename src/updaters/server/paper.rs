// PaperMC server updater (Paper, Folia, Velocity, Waterfall)

use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, UpdateCheck, UpdateContext, Updater,
    UpdaterConfig, version,
};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

const DEFAULT_API: &str = "https://api.papermc.io/v2";

#[derive(Debug, Deserialize)]
struct VersionBuilds {
    builds: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct Build {
    downloads: Downloads,
}

#[derive(Debug, Deserialize)]
struct Downloads {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    name: String,
    sha256: String,
}

pub struct PaperUpdater {
    api: String,
}

impl PaperUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for PaperUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for PaperUpdater {
    fn updater_name(&self) -> &'static str {
        "PaperMC"
    }

    fn config_path(&self) -> &'static str {
        "papermc"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment::default()
    }

    fn server_types(&self) -> &'static [&'static str] {
        &["paper", "folia", "velocity", "waterfall"]
    }

    fn instantiate(
        &self,
        resource: ResourceIdentity,
        _config: UpdaterConfig,
        ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(PaperCheck {
            api: self.api.clone(),
            resource,
            ctx,
            delta: UpdaterConfig::default(),
        }))
    }
}

struct PaperCheck {
    api: String,
    resource: ResourceIdentity,
    ctx: UpdateContext,
    delta: UpdaterConfig,
}

#[async_trait]
impl UpdateCheck for PaperCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let project = self.resource.name.to_ascii_lowercase();
        let Some(game_version) = self.resource.version.as_deref() else {
            return Ok(None);
        };

        let builds: VersionBuilds = http::fetch_json(
            &http::make_url(&self.api, &["projects", &project, "versions", game_version], &[]),
            &Headers::new(),
        )
        .await?;
        let Some(build) = builds.builds.iter().copied().max() else {
            debug!("{} {} has no builds yet", project, game_version);
            return Ok(None);
        };

        let build_path = build.to_string();
        let details: Build = http::fetch_json(
            &http::make_url(
                &self.api,
                &["projects", &project, "versions", game_version, "builds", &build_path],
                &[],
            ),
            &Headers::new(),
        )
        .await?;
        let application = details.downloads.application;

        if !version::is_different(
            self.resource.hashes.sha256.as_deref(),
            &application.sha256,
            self.ctx.skip_version_check,
        ) {
            debug!("{} build {} is already installed", project, build);
            return Ok(None);
        }

        let url = http::make_url(
            &self.api,
            &[
                "projects",
                &project,
                "versions",
                game_version,
                "builds",
                &build_path,
                "downloads",
                &application.name,
            ],
            &[],
        );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updaters::Hashes;
    use mockito::Server;

    const SHA: &str = "0d1f1e8a3a8f1b6b3bd1dbf5b0c8b5a0e6e0c2b3a1d0f9e8d7c6b5a4f3e2d1c0";

    fn identity(sha256: &str) -> ResourceIdentity {
        ResourceIdentity {
            name: "paper".into(),
            version: Some("1.20.4".into()),
            hashes: Hashes {
                sha256: Some(sha256.into()),
                ..Default::default()
            },
        }
    }

    async fn stub(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
        let builds = server
            .mock("GET", "/projects/paper/versions/1.20.4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"builds":[494,496,495]}"#)
            .create_async()
            .await;
        let build = server
            .mock("GET", "/projects/paper/versions/1.20.4/builds/496")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"downloads":{{"application":{{"name":"paper-1.20.4-496.jar","sha256":"{}"}}}}}}"#,
                SHA
            ))
            .create_async()
            .await;
        let head = server
            .mock(
                "HEAD",
                "/projects/paper/versions/1.20.4/builds/496/downloads/paper-1.20.4-496.jar",
            )
            .with_status(200)
            .with_header("content-type", "application/java-archive")
            .create_async()
            .await;
        vec![builds, build, head]
    }

    #[tokio::test]
    async fn test_newest_build_with_new_hash() {
        let mut server = Server::new_async().await;
        let _mocks = stub(&mut server).await;

        let mut check = PaperUpdater::new(&server.url())
            .instantiate(identity("a"), UpdaterConfig::default(), UpdateContext::default())
            .unwrap();
        let descriptor = check.resolve_update().await.unwrap().unwrap();

        assert!(descriptor.url.ends_with("/builds/496/downloads/paper-1.20.4-496.jar"));
        assert_eq!(check.config_delta().resource_i64("build_number"), Some(496));
    }

    #[tokio::test]
    async fn test_same_hash_is_no_update() {
        let mut server = Server::new_async().await;
        let _mocks = stub(&mut server).await;

        let mut check = PaperUpdater::new(&server.url())
            .instantiate(identity(SHA), UpdaterConfig::default(), UpdateContext::default())
            .unwrap();
        assert!(check.resolve_update().await.unwrap().is_none());
    }
}
