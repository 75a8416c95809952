// Config module for the persisted YAML document
//
// The document is kept as a `serde_yaml::Value` tree and addressed with dotted
// paths (`settings.update_cooldown`) or key slices when a key may itself
// contain dots (plugin names).

pub mod default;
pub mod paths;
pub mod schema;

pub use paths::Paths;
pub use schema::{ConfigSchema, FieldKind, MapSchema, reconcile_keys};

use crate::error::ConfigError;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    data: Value,
}

impl Config {
    /// Load and validate the config file, starting from the default document
    /// when the file does not exist yet.
    pub fn load(path: &Path, schema: &ConfigSchema) -> Result<Self, ConfigError> {
        let data = read_document(path, schema)?;
        schema.validate(&data)?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn from_value(path: impl Into<PathBuf>, data: Value) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// `None` when the path does not exist, `Some(Value::Null)` when it holds null
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.get_in(&split(path))
    }

    pub fn get_in(&self, keys: &[&str]) -> Option<&Value> {
        value_lookup(&self.data, keys)
    }

    pub fn get_mut_in(&mut self, keys: &[&str]) -> Option<&mut Value> {
        let mut node = &mut self.data;
        for key in keys {
            node = node.as_mapping_mut()?.get_mut(*key)?;
        }
        Some(node)
    }

    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get(path).and_then(value_as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(value_as_bool)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(value_as_i64)
    }

    pub fn get_str_list(&self, path: &str) -> Vec<String> {
        self.get(path).map(value_as_str_list).unwrap_or_default()
    }

    pub fn get_mapping_in(&self, keys: &[&str]) -> Option<&Mapping> {
        self.get_in(keys).and_then(Value::as_mapping)
    }

    /// Set a value, creating intermediate mappings as needed
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        self.set_in(&split(path), value);
    }

    pub fn set_in(&mut self, keys: &[&str], value: impl Into<Value>) {
        value_insert(&mut self.data, keys, value.into());
    }

    pub fn remove_in(&mut self, keys: &[&str]) -> Option<Value> {
        let (last, parents) = keys.split_last()?;
        self.get_mut_in(parents)?.as_mapping_mut()?.remove(*last)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_yaml::to_string(&self.data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Re-read the file from disk, discarding in-memory changes
    pub fn reload(&mut self, schema: &ConfigSchema) -> Result<(), ConfigError> {
        let data = read_document(&self.path, schema)?;
        schema.validate(&data)?;
        self.data = data;
        Ok(())
    }
}

fn read_document(path: &Path, schema: &ConfigSchema) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(schema.default_config().clone());
    }
    let content = fs::read_to_string(path)?;
    let data: Value = serde_yaml::from_str(&content)?;
    if data.is_null() {
        return Ok(schema.default_config().clone());
    }
    Ok(data)
}

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|k| !k.is_empty()).collect()
}

pub(crate) fn value_lookup<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for key in keys {
        node = node.as_mapping()?.get(*key)?;
    }
    Some(node)
}

pub(crate) fn value_insert(root: &mut Value, keys: &[&str], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for key in parents {
        node = mapping_or_reset(node)
            .entry(Value::from(*key))
            .or_insert(Value::Null);
    }
    mapping_or_reset(node).insert(Value::from(*last), value);
}

fn mapping_or_reset(node: &mut Value) -> &mut Mapping {
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(map) => map,
        _ => unreachable!("node was just replaced by a mapping"),
    }
}

/// Scalars as text. Numbers count as strings so numeric ids still read.
/// Float formatting drops trailing zeros, so versions are validated as
/// `FieldKind::Version`.
pub fn value_as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Some(true),
            "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A list of strings, or a single string as a one-element list
pub fn value_as_str_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(value_as_str).collect(),
        other => value_as_str(other).into_iter().collect(),
    }
}
