// Updaters module: the backend contract and the built-in update sources
//
// An `Updater` is the static, registrable description of an update source.
// For every resource it hands out a fresh `UpdateCheck` that owns its own copy
// of the identity and settings, so nothing one attempt does can leak into the
// next candidate or into the shared config.

use crate::config::{MapSchema, value_as_bool, value_as_i64, value_as_str, value_as_str_list};
use async_trait::async_trait;
use regex::Regex;
use serde_yaml::{Mapping, Value};

pub mod github_api;
pub mod http;
pub mod jenkins_api;
pub mod plugin;
pub mod server;
pub mod version;

pub use crate::hash::Hashes;
pub use http::Headers;

/// What a backend gets to know about the resource it checks.
/// For the server, `name` is the server type and `version` the game version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub name: String,
    pub version: Option<String>,
    pub hashes: Hashes,
}

/// Where to fetch a newer artifact from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub headers: Headers,
}

impl DownloadDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Settings of one backend: the shared part from `updater_settings.<kind>.<path>`
/// and the part owned by a single resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdaterConfig {
    pub common: Mapping,
    pub resource: Mapping,
}

impl UpdaterConfig {
    pub fn new(common: Mapping, resource: Mapping) -> Self {
        Self { common, resource }
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty() && self.resource.is_empty()
    }

    /// Non-empty resource setting as text
    pub fn resource_str(&self, key: &str) -> Option<String> {
        non_empty(self.resource.get(key).and_then(value_as_str))
    }

    pub fn resource_bool(&self, key: &str) -> Option<bool> {
        self.resource.get(key).and_then(value_as_bool)
    }

    pub fn resource_i64(&self, key: &str) -> Option<i64> {
        self.resource.get(key).and_then(value_as_i64)
    }

    pub fn resource_list(&self, key: &str) -> Vec<String> {
        self.resource
            .get(key)
            .map(value_as_str_list)
            .unwrap_or_default()
    }

    pub fn common_str(&self, key: &str) -> Option<String> {
        non_empty(self.common.get(key).and_then(value_as_str))
    }

    pub fn set_resource(&mut self, key: &str, value: impl Into<Value>) {
        self.resource.insert(Value::from(key), value.into());
    }

    #[cfg(test)]
    pub fn set_common(&mut self, key: &str, value: impl Into<Value>) {
        self.common.insert(Value::from(key), value.into());
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Compile the optional `name_regex` setting used to pick a file out of a release
pub(crate) fn name_regex(config: &UpdaterConfig) -> anyhow::Result<Option<Regex>> {
    config
        .resource_str("name_regex")
        .map(|pattern| {
            Regex::new(&pattern)
                .map_err(|e| anyhow::anyhow!("Invalid name_regex '{}': {}", pattern, e))
        })
        .transpose()
}

/// Pick the first name matching `regex`, or the first jar when no regex is set
pub(crate) fn matches_file(regex: Option<&Regex>, file_name: &str) -> bool {
    match regex {
        Some(regex) => regex.is_match(file_name),
        None => file_name.ends_with(".jar"),
    }
}

/// Validators plus the default YAML block for one settings mapping
#[derive(Debug, Clone)]
pub struct SettingsFragment {
    pub schema: MapSchema,
    pub default_yaml: &'static str,
}

impl SettingsFragment {
    pub fn new(schema: MapSchema, default_yaml: &'static str) -> Self {
        Self {
            schema,
            default_yaml,
        }
    }
}

/// Settings a backend contributes to the config. Server backends have no
/// per-resource settings.
#[derive(Debug, Clone, Default)]
pub struct SchemaFragment {
    pub common: Option<SettingsFragment>,
    pub resource: Option<SettingsFragment>,
}

/// Run-wide switches every check honors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateContext {
    /// Treat every comparison as "remote is newer"
    pub skip_version_check: bool,
}

/// A registrable update source
pub trait Updater: Send + Sync {
    /// Stable name used in logs
    fn updater_name(&self) -> &'static str;

    /// Unique key of the settings namespace, also the registry key
    fn config_path(&self) -> &'static str;

    fn updater_version(&self) -> &'static str {
        "1.0"
    }

    fn config_schema(&self) -> SchemaFragment;

    /// Server flavors this backend can update. Empty for plugin backends.
    fn server_types(&self) -> &'static [&'static str] {
        &[]
    }

    /// Build a check for one resource. Fails when the settings cannot be used.
    fn instantiate(
        &self,
        resource: ResourceIdentity,
        config: UpdaterConfig,
        ctx: UpdateContext,
    ) -> anyhow::Result<Box<dyn UpdateCheck>>;
}

/// One backend looking at one resource
#[async_trait]
pub trait UpdateCheck: Send {
    /// `Ok(None)` means this backend has nothing newer
    async fn resolve_update(&mut self) -> anyhow::Result<Option<DownloadDescriptor>>;

    /// State to persist once the download went through
    fn config_delta(&self) -> UpdaterConfig {
        UpdaterConfig::default()
    }
}
