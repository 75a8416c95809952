// Custom URL server updater

use crate::updaters::plugin::custom::UrlCheck;
use crate::updaters::{
    ResourceIdentity, SchemaFragment, UpdateCheck, UpdateContext, Updater, UpdaterConfig,
};

#[derive(Default)]
pub struct CustomServerUpdater;

impl Updater for CustomServerUpdater {
    fn updater_name(&self) -> &'static str {
        "Custom URL"
    }

    fn config_path(&self) -> &'static str {
        "custom_url"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment::default()
    }

    fn server_types(&self) -> &'static [&'static str] {
        &["custom"]
    }

    /// Reads `server.custom_url`
    fn instantiate(
        &self,
        _resource: ResourceIdentity,
        config: UpdaterConfig,
        _ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(UrlCheck {
            url: config.resource_str("custom_url"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_offers_custom_url_serving_a_jar() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("HEAD", "/server.jar")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .create_async()
            .await;

        let url = format!("{}/server.jar", server.url());
        let mut resource = serde_yaml::Mapping::new();
        resource.insert("custom_url".into(), url.clone().into());
        let mut check = CustomServerUpdater
            .instantiate(
                ResourceIdentity::default(),
                UpdaterConfig::new(Default::default(), resource),
                UpdateContext::default(),
            )
            .unwrap();

        assert_eq!(check.resolve_update().await.unwrap().unwrap().url, url);
    }
}
