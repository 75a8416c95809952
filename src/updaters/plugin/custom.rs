// Plain URL plugin updater

use crate::config::{FieldKind, MapSchema};
use crate::updaters::http::{self, Headers};
use crate::updaters::{
    DownloadDescriptor, ResourceIdentity, SchemaFragment, SettingsFragment, UpdateCheck,
    UpdateContext, Updater, UpdaterConfig,
};
use async_trait::async_trait;

const RESOURCE_DEFAULT: &str = "\
# Direct link to the jar. It carries no version, so it is fetched on every run.
url:
";

#[derive(Default)]
pub struct CustomUrlUpdater;

impl Updater for CustomUrlUpdater {
    fn updater_name(&self) -> &'static str {
        "Custom URL"
    }

    fn config_path(&self) -> &'static str {
        "custom_url"
    }

    fn config_schema(&self) -> SchemaFragment {
        SchemaFragment {
            common: None,
            resource: Some(SettingsFragment::new(
                MapSchema::new().optional("url", FieldKind::Url),
                RESOURCE_DEFAULT,
            )),
        }
    }

    fn instantiate(
        &self,
        _resource: ResourceIdentity,
        config: UpdaterConfig,
        _ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>> {
        Ok(Box::new(UrlCheck {
            url: config.resource_str("url"),
        }))
    }
}

/// Offers a fixed URL when it serves a jar. Shared with the custom server updater.
pub(crate) struct UrlCheck {
    pub(crate) url: Option<String>,
}

#[async_trait]
impl UpdateCheck for UrlCheck {
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>> {
        let Some(url) = self.url.as_deref() else {
            return Ok(None);
        };
        if !http::is_downloadable(url, &Headers::new()).await {
            return Ok(None);
        }
        Ok(Some(DownloadDescriptor::new(url)))
    }
}
