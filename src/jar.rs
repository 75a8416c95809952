// Plugin archive metadata extraction

use anyhow::Result;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Identity a plugin jar declares about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarInfo {
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
}

impl JarInfo {
    /// `"<name> [<version>].jar"`
    pub fn file_name(&self) -> String {
        format!(
            "{} [{}].jar",
            sanitize(&self.name),
            sanitize(&self.version)
        )
    }
}

/// Keep generated names inside the plugins directory
fn sanitize(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// Bukkit style descriptors, first match wins
const YAML_DESCRIPTORS: &[&str] = &["paper-plugin.yml", "plugin.yml", "bungee.yml"];
const JSON_DESCRIPTORS: &[&str] = &["velocity-plugin.json", "fabric.mod.json"];
const FORGE_DESCRIPTOR: &str = "META-INF/mods.toml";

pub fn read_jar_info(path: &Path) -> Result<JarInfo> {
    let file = fs::File::open(path)?;
    read_archive_info(file)
        .map_err(|e| anyhow::anyhow!("Failed to read plugin info from {}: {}", path.display(), e))
}

pub fn read_archive_info<R: Read + Seek>(reader: R) -> Result<JarInfo> {
    let mut archive = ZipArchive::new(reader)?;

    for name in YAML_DESCRIPTORS {
        if let Some(contents) = read_entry(&mut archive, name)? {
            let data: YamlValue = serde_yaml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", name, e))?;
            return info_from_yaml(&data, name);
        }
    }

    for name in JSON_DESCRIPTORS {
        if let Some(contents) = read_entry(&mut archive, name)? {
            let data: JsonValue = serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", name, e))?;
            return info_from_json(&data, name);
        }
    }

    if let Some(contents) = read_entry(&mut archive, FORGE_DESCRIPTOR)? {
        let data: toml::Table = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", FORGE_DESCRIPTOR, e))?;
        return info_from_mods_toml(&data);
    }

    anyhow::bail!("no plugin descriptor found in archive")
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

fn yaml_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Sequence(items) => items.first().and_then(yaml_text),
        _ => None,
    }
}

fn info_from_yaml(data: &YamlValue, descriptor: &str) -> Result<JarInfo> {
    let name = data
        .get("name")
        .and_then(yaml_text)
        .ok_or_else(|| anyhow::anyhow!("{} missing 'name' field", descriptor))?;
    let version = data
        .get("version")
        .and_then(yaml_text)
        .unwrap_or_else(|| "0".to_string());
    let authors = match data.get("authors").or_else(|| data.get("author")) {
        Some(YamlValue::Sequence(items)) => items.iter().filter_map(yaml_text).collect(),
        Some(other) => yaml_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    Ok(JarInfo {
        name,
        version,
        authors,
    })
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Array(items) => items.first().and_then(json_text),
        // fabric allows { "name": ..., "contact": ... } person objects
        JsonValue::Object(map) => map.get("name").and_then(json_text),
        _ => None,
    }
}

fn info_from_json(data: &JsonValue, descriptor: &str) -> Result<JarInfo> {
    let name = data
        .get("name")
        .and_then(json_text)
        .or_else(|| data.get("id").and_then(json_text))
        .ok_or_else(|| anyhow::anyhow!("{} missing 'name' and 'id' fields", descriptor))?;
    let version = data
        .get("version")
        .and_then(json_text)
        .unwrap_or_else(|| "0".to_string());
    let authors = match data.get("authors") {
        Some(JsonValue::Array(items)) => items.iter().filter_map(json_text).collect(),
        Some(other) => json_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    Ok(JarInfo {
        name,
        version,
        authors,
    })
}

fn info_from_mods_toml(data: &toml::Table) -> Result<JarInfo> {
    let first_mod = data
        .get("mods")
        .and_then(|mods| mods.as_array())
        .and_then(|mods| mods.first())
        .ok_or_else(|| anyhow::anyhow!("{} has no [[mods]] entry", FORGE_DESCRIPTOR))?;
    let text = |key: &str| {
        first_mod
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let name = text("modId")
        .ok_or_else(|| anyhow::anyhow!("{} missing 'modId' field", FORGE_DESCRIPTOR))?;
    Ok(JarInfo {
        name,
        version: text("version").unwrap_or_else(|| "0".to_string()),
        authors: text("authors").into_iter().collect(),
    })
}

/// Move `path` to its canonical name next to it, returning the new path
pub fn rename_jar(path: &Path, info: &JarInfo) -> Result<PathBuf> {
    let target = path.with_file_name(info.file_name());
    if target != path {
        fs::rename(path, &target).map_err(|e| {
            anyhow::anyhow!(
                "Failed to rename {} to {}: {}",
                path.display(),
                target.display(),
                e
            )
        })?;
    }
    Ok(target)
}
