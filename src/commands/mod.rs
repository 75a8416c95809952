// User-facing commands

pub mod init;
pub mod run;
pub mod scan;

use crate::config::{Config, ConfigSchema, Paths};
use crate::registry::Registries;
use log::debug;

/// Everything a command needs before it touches the config: the registries
/// and the schema derived from them
pub struct Workspace {
    pub paths: Paths,
    pub registries: Registries,
    pub schema: ConfigSchema,
}

impl Workspace {
    pub fn new(paths: Paths) -> anyhow::Result<Self> {
        let registries = Registries::builtin();
        if registries.plugin.is_empty() && registries.server.is_empty() {
            anyhow::bail!("No updaters could be registered");
        }
        debug!(
            "{} plugin and {} server updaters registered",
            registries.plugin.len(),
            registries.server.len()
        );
        let schema = registries.build_schema()?;
        Ok(Self {
            paths,
            registries,
            schema,
        })
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        let path = self.paths.config_file();
        Config::load(path, &self.schema)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))
    }
}
