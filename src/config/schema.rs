// Config schema: field validators and default documents
//
// The base layout is fixed. Updater registries extend it with the common and
// per-resource settings of every registered backend before the config file is
// loaded for the first time.

use super::{default, value_as_bool, value_as_i64, value_as_str, value_insert};
use crate::error::ConfigError;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    /// A string that must be written as one, `1.20` would read back as `1.2`
    Version,
    NonEmptyStr,
    Int,
    Bool,
    /// A single string or a list of strings
    StrList,
    OneOf(&'static [&'static str]),
    Url,
    Map,
    Any,
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::Str => "a string".into(),
            FieldKind::Version => "a quoted version string, like \"1.20\"".into(),
            FieldKind::NonEmptyStr => "a non-empty string".into(),
            FieldKind::Int => "an integer".into(),
            FieldKind::Bool => "a boolean".into(),
            FieldKind::StrList => "a string or a list of strings".into(),
            FieldKind::OneOf(options) => format!("one of: {}", options.join(", ")),
            FieldKind::Url => "an http(s) URL".into(),
            FieldKind::Map => "a mapping".into(),
            FieldKind::Any => "any value".into(),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Str => value_as_str(value).is_some(),
            FieldKind::Version => value.is_string(),
            FieldKind::NonEmptyStr => value_as_str(value).is_some_and(|s| !s.trim().is_empty()),
            FieldKind::Int => value_as_i64(value).is_some(),
            FieldKind::Bool => value_as_bool(value).is_some(),
            FieldKind::StrList => match value {
                Value::Sequence(items) => items.iter().all(|item| value_as_str(item).is_some()),
                other => value_as_str(other).is_some(),
            },
            FieldKind::OneOf(options) => value_as_str(value)
                .is_some_and(|s| options.iter().any(|o| o.eq_ignore_ascii_case(&s))),
            FieldKind::Url => value_as_str(value)
                .is_some_and(|s| s.starts_with("http://") || s.starts_with("https://")),
            FieldKind::Map => value.is_mapping(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub key: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

/// Validators for the keys of one mapping. Keys the schema does not list are
/// tolerated, and missing keys are filled in from the defaults elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MapSchema {
    fields: Vec<Field>,
}

impl MapSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, key: &'static str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            key,
            kind,
            nullable: false,
        });
        self
    }

    pub fn optional(mut self, key: &'static str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            key,
            kind,
            nullable: true,
        });
        self
    }

    pub fn validate(&self, path: &str, value: &Value) -> Result<(), ConfigError> {
        let map = match value {
            Value::Null => return Ok(()),
            Value::Mapping(map) => map,
            _ => return Err(ConfigError::invalid(path, "a mapping")),
        };

        for field in &self.fields {
            let Some(found) = map.get(field.key) else {
                continue;
            };
            if found.is_null() {
                if field.nullable {
                    continue;
                }
                return Err(ConfigError::invalid(
                    join_path(path, field.key),
                    field.kind.describe(),
                ));
            }
            if !field.kind.accepts(found) {
                return Err(ConfigError::invalid(
                    join_path(path, field.key),
                    field.kind.describe(),
                ));
            }
        }
        Ok(())
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn hashes_schema() -> MapSchema {
    MapSchema::new()
        .optional("md5", FieldKind::Str)
        .optional("sha1", FieldKind::Str)
        .optional("sha256", FieldKind::Str)
        .optional("sha512", FieldKind::Str)
}

/// The full, dynamically extended config schema plus the default documents
/// derived from it.
#[derive(Debug, Clone)]
pub struct ConfigSchema {
    sections: Vec<(&'static str, MapSchema)>,
    plugin_entry: MapSchema,
    plugin_resource: BTreeMap<String, MapSchema>,
    plugin_common: BTreeMap<String, MapSchema>,
    server_common: BTreeMap<String, MapSchema>,
    default_config: Value,
    default_plugin: Value,
}

impl ConfigSchema {
    /// Schema and defaults of the fixed part of the config
    pub fn base() -> Result<Self, ConfigError> {
        let sections = vec![
            (
                "",
                MapSchema::new()
                    .optional("last_update", FieldKind::Str)
                    .required("settings", FieldKind::Map)
                    .optional("updater_settings", FieldKind::Map)
                    .required("server", FieldKind::Map)
                    .optional("plugins", FieldKind::Map),
            ),
            (
                "settings",
                MapSchema::new()
                    .optional("server_folder", FieldKind::Str)
                    .required("update_cooldown", FieldKind::Int)
                    .required("keep_removed", FieldKind::Bool)
                    .optional("update_order", FieldKind::StrList),
            ),
            (
                "updater_settings",
                MapSchema::new()
                    .optional("server", FieldKind::Map)
                    .optional("plugin", FieldKind::Map),
            ),
            (
                "server",
                MapSchema::new()
                    .required("enable", FieldKind::Bool)
                    .required("file", FieldKind::NonEmptyStr)
                    .required("type", FieldKind::NonEmptyStr)
                    .optional("version", FieldKind::Version)
                    .optional("build_number", FieldKind::Int)
                    .optional("custom_url", FieldKind::Url)
                    .optional("hashes", FieldKind::Map),
            ),
            ("server.hashes", hashes_schema()),
        ];

        let plugin_entry = MapSchema::new()
            .required("exclude", FieldKind::Bool)
            .optional("file", FieldKind::Str)
            .optional("version", FieldKind::Version)
            .optional("authors", FieldKind::StrList)
            .optional("hashes", FieldKind::Map);

        Ok(Self {
            sections,
            plugin_entry,
            plugin_resource: BTreeMap::new(),
            plugin_common: BTreeMap::new(),
            server_common: BTreeMap::new(),
            default_config: serde_yaml::from_str(default::DEFAULT_CONFIG)?,
            default_plugin: serde_yaml::from_str(default::DEFAULT_PLUGIN)?,
        })
    }

    /// Register the settings of a plugin updater living under `config_path`
    pub fn add_plugin_updater(
        &mut self,
        config_path: &str,
        common: Option<(MapSchema, Value)>,
        resource: Option<(MapSchema, Value)>,
    ) {
        if let Some((schema, default)) = common {
            self.plugin_common.insert(config_path.to_string(), schema);
            value_insert(
                &mut self.default_config,
                &["updater_settings", "plugin", config_path],
                default,
            );
        }
        if let Some((schema, default)) = resource {
            self.plugin_resource.insert(config_path.to_string(), schema);
            value_insert(&mut self.default_plugin, &[config_path], default);
        }
    }

    /// Register the common settings of a server updater living under `config_path`
    pub fn add_server_updater(&mut self, config_path: &str, common: Option<(MapSchema, Value)>) {
        if let Some((schema, default)) = common {
            self.server_common.insert(config_path.to_string(), schema);
            value_insert(
                &mut self.default_config,
                &["updater_settings", "server", config_path],
                default,
            );
        }
    }

    pub fn default_config(&self) -> &Value {
        &self.default_config
    }

    /// Template for a freshly discovered plugin entry
    pub fn default_plugin(&self) -> &Value {
        &self.default_plugin
    }

    pub fn validate(&self, data: &Value) -> Result<(), ConfigError> {
        if !data.is_mapping() {
            return Err(ConfigError::invalid("<root>", "a mapping"));
        }

        for (path, schema) in &self.sections {
            if let Some(value) = super::value_lookup(data, &split_path(path)) {
                schema.validate(path, value)?;
            }
        }

        validate_updaters(data, "updater_settings.plugin", &self.plugin_common)?;
        validate_updaters(data, "updater_settings.server", &self.server_common)?;

        if let Some(Value::Mapping(plugins)) = data.get("plugins") {
            for (name, entry) in plugins {
                let name = value_as_str(name).unwrap_or_default();
                let path = format!("plugins.{}", name);
                self.plugin_entry.validate(&path, entry)?;
                if let Some(hashes) = entry.get("hashes") {
                    hashes_schema().validate(&format!("{}.hashes", path), hashes)?;
                }
                for (updater, schema) in &self.plugin_resource {
                    if let Some(settings) = entry.get(updater.as_str()) {
                        schema.validate(&format!("{}.{}", path, updater), settings)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

fn validate_updaters(
    data: &Value,
    parent: &str,
    schemas: &BTreeMap<String, MapSchema>,
) -> Result<(), ConfigError> {
    let Some(Value::Mapping(settings)) = super::value_lookup(data, &split_path(parent)) else {
        return Ok(());
    };
    for (path, schema) in schemas {
        if let Some(value) = settings.get(path.as_str()) {
            schema.validate(&format!("{}.{}", parent, path), value)?;
        }
    }
    Ok(())
}

/// Make `data` carry every key of `default`, recursing into nested mappings.
/// With `remove_unknown`, keys that `default` does not know are dropped.
/// Returns true when `data` was changed.
pub fn reconcile_keys(data: &mut Value, default: &Value, remove_unknown: bool) -> bool {
    let Value::Mapping(default_map) = default else {
        return false;
    };
    if data.is_null() {
        *data = default.clone();
        return true;
    }
    let Value::Mapping(map) = data else {
        return false;
    };

    let mut changed = false;
    for (key, default_value) in default_map {
        match map.get_mut(key) {
            Some(existing) => changed |= reconcile_keys(existing, default_value, remove_unknown),
            None => {
                map.insert(key.clone(), default_value.clone());
                changed = true;
            }
        }
    }

    if remove_unknown && map.keys().any(|k| !default_map.contains_key(k)) {
        let kept: Mapping = std::mem::take(map)
            .into_iter()
            .filter(|(k, _)| default_map.contains_key(k))
            .collect();
        *map = kept;
        changed = true;
    }
    changed
}
