// Purpur server updater

use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, UpdateCheck, UpdateContext, Updater,
    UpdaterConfig, version,
};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_API: &str = "https://api.purpurmc.org/v2/purpur";

#[derive(Debug, Deserialize)]
struct VersionInfo {
    builds: Builds,
}

#[derive(Debug, Deserialize)]
struct Builds {
    latest: String,
}

pub struct PurpurUpdater {
    api: String,
}

impl PurpurUpdater {
    pub fn new(api: &str) -> Self {
        Self {
            api: api.to_string(),
        }
    }
}

impl Default for PurpurUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_API)
    }
}

impl Updater for PurpurUpdater {
    fn updater_name(&self) -> &'static str {
        "Purpur"
    }

    fn config_path(&self) -> &'static str {
        "purpur"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment::default()
    }

    fn server_types(&self) -> &'static [&'static str] {
        &["purpur"]
    }

    fn instantiate(
        &self,
        resource: ResourceIdentity,
        config: UpdaterConfig,
        ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(PurpurCheck {
            api: self.api.clone(),
            build_number: config.resource_i64("build_number"),
            resource,
            ctx,
            delta: UpdaterConfig::default(),
        }))
    }
}

struct PurpurCheck {
    api: String,
    resource: ResourceIdentity,
    build_number: Option<i64>,
    ctx: UpdateContext,
    delta: UpdaterConfig,
}

#[async_trait]
impl UpdateCheck for PurpurCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(game_version) = self.resource.version.as_deref() else {
            return Ok(None);
        };

        let info: VersionInfo = http::fetch_json(
            &http::make_url(&self.api, &[game_version], &[]),
            &Headers::new(),
        )
        .await?;
        let latest: i64 = info.builds.latest.trim().parse().map_err(|_| {
            anyhow::anyhow!("Purpur reported a non-numeric build '{}'", info.builds.latest)
        })?;

        if !version::has_newer_build(self.build_number, latest, self.ctx.skip_version_check) {
            return Ok(None);
        }

        let url = http::make_url(
            &self.api,
            &[game_version, &latest.to_string(), "download"],
            &[],
        );
        if !http::is_downloadable(&url, &Headers::new()).await {
            return Ok(None);
        }

        self.delta.set_resource("build_number", latest);
        Ok(Some(DownloadDescriptor::new(url)))
    }

    fn config_delta(&self) -> UpdaterConfig {
        self.delta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn check(api: &str, build: &str) -> Box<dyn UpdateCheck> {
        PurpurUpdater::new(api)
            .instantiate(
                ResourceIdentity {
                    name: "purpur".into(),
                    version: Some("1.20.4".into()),
                    ..Default::default()
                },
                UpdaterConfig::new(
                    Default::default(),
                    serde_yaml::from_str(&format!("build_number: {}", build)).unwrap(),
                ),
                UpdateContext::default(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_latest_build_compared_by_number() {
        let mut server = Server::new_async().await;
        let _info = server
            .mock("GET", "/1.20.4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"builds":{"all":["2175","2176"],"latest":"2176"}}"#)
            .create_async()
            .await;
        let _head = server
            .mock("HEAD", "/1.20.4/2176/download")
            .with_status(200)
            .with_header("content-type", "application/java-archive")
            .create_async()
            .await;

        let mut outdated = check(&server.url(), "2175");
        assert!(outdated.resolve_update().await.unwrap().is_some());
        assert_eq!(outdated.config_delta().resource_i64("build_number"), Some(2176));

        let mut current = check(&server.url(), "2176");
        assert!(current.resolve_update().await.unwrap().is_none());
    }
}
