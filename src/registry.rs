// Updater registries
//
// Built once at startup: register every backend, then derive the config schema
// from the registrations, then load the config against it.

use crate::config::{ConfigSchema, MapSchema};
use crate::error::ConfigError;
use crate::updaters::{
    self, ResourceIdentity, SettingsFragment, UpdateContext, Updater, UpdaterConfig,
};
use log::{debug, error, warn};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::Arc;

struct Registration {
    updater: Arc<dyn Updater>,
    common: Option<(MapSchema, Value)>,
    resource: Option<(MapSchema, Value)>,
}

/// One namespace of backends keyed by config path, kept in registration order
#[derive(Default)]
pub struct Registry {
    registrations: Vec<Registration>,
    index: HashMap<&'static str, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Returns false, leaving the registry untouched, when the
    /// backend is a duplicate or cannot be set up.
    pub fn register(&mut self, updater: Arc<dyn Updater>) -> bool {
        let name = updater.updater_name();
        let path = updater.config_path();
        if name.trim().is_empty() || path.trim().is_empty() {
            error!("Skipping an updater without a name or config path");
            return false;
        }

        if self.index.contains_key(path) {
            warn!(
                "Updater '{}' uses config path '{}' which is already registered, ignoring it",
                name, path
            );
            return false;
        }

        let fragment = updater.config_schema();
        let (common, resource) = match (
            parse_fragment(fragment.common),
            parse_fragment(fragment.resource),
        ) {
            (Ok(common), Ok(resource)) => (common, resource),
            (Err(e), _) | (_, Err(e)) => {
                error!("Updater '{}' has an unreadable default config: {}", name, e);
                return false;
            }
        };

        // Construct once with the defaults to make sure it can be built at all
        let probe = UpdaterConfig::new(
            default_mapping(common.as_ref()),
            default_mapping(resource.as_ref()),
        );
        if let Err(e) = updater.instantiate(
            ResourceIdentity::default(),
            probe,
            UpdateContext::default(),
        ) {
            error!("Updater '{}' failed to initialize: {}", name, e);
            return false;
        }

        debug!(
            "Registered updater '{}' v{} at '{}'",
            name,
            updater.updater_version(),
            path
        );
        self.index.insert(path, self.registrations.len());
        self.registrations.push(Registration {
            updater,
            common,
            resource,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn backend_for(&self, config_path: &str) -> Option<Arc<dyn Updater>> {
        self.index
            .get(config_path)
            .map(|&i| Arc::clone(&self.registrations[i].updater))
    }

    /// Server backends answering for `server_type`, in registration order
    pub fn backends_for(&self, server_type: &str) -> Vec<Arc<dyn Updater>> {
        self.registrations
            .iter()
            .filter(|r| {
                r.updater
                    .server_types()
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(server_type))
            })
            .map(|r| Arc::clone(&r.updater))
            .collect()
    }

    pub fn config_paths(&self) -> Vec<&'static str> {
        self.registrations
            .iter()
            .map(|r| r.updater.config_path())
            .collect()
    }

    pub fn server_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self
            .registrations
            .iter()
            .flat_map(|r| r.updater.server_types().iter().copied())
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Default shared settings of every backend that has some, keyed by config path
    pub fn common_defaults(&self) -> Mapping {
        self.registrations
            .iter()
            .filter_map(|r| {
                r.common
                    .as_ref()
                    .map(|(_, default)| (Value::from(r.updater.config_path()), default.clone()))
            })
            .collect()
    }
}

fn parse_fragment(
    fragment: Option<SettingsFragment>,
) -> Result<Option<(MapSchema, Value)>, serde_yaml::Error> {
    let Some(fragment) = fragment else {
        return Ok(None);
    };
    let mut default: Value = serde_yaml::from_str(fragment.default_yaml)?;
    if default.is_null() {
        default = Value::Mapping(Mapping::new());
    }
    Ok(Some((fragment.schema, default)))
}

fn default_mapping(fragment: Option<&(MapSchema, Value)>) -> Mapping {
    fragment
        .and_then(|(_, default)| default.as_mapping().cloned())
        .unwrap_or_default()
}

/// The plugin and server registries of one process
#[derive(Default)]
pub struct Registries {
    pub plugin: Registry,
    pub server: Registry,
}

impl Registries {
    /// Registries holding every built-in backend
    pub fn builtin() -> Self {
        let mut registries = Self::default();
        for updater in updaters::plugin::builtin() {
            registries.plugin.register(updater);
        }
        for updater in updaters::server::builtin() {
            registries.server.register(updater);
        }
        registries
    }

    /// Base schema extended with the settings of every registered backend
    pub fn build_schema(&self) -> Result<ConfigSchema, ConfigError> {
        let mut schema = ConfigSchema::base()?;
        for registration in &self.plugin.registrations {
            schema.add_plugin_updater(
                registration.updater.config_path(),
                registration.common.clone(),
                registration.resource.clone(),
            );
        }
        for registration in &self.server.registrations {
            schema.add_server_updater(
                registration.updater.config_path(),
                registration.common.clone(),
            );
        }
        Ok(schema)
    }
}
