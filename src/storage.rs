// Server folder access, local or through a remote storage transport
//
// Paths handed to `ServerFolder` are relative to the server root and use `/`
// separators, e.g. `plugins/Essentials [2.1].jar`.

use anyhow::Result;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File operations on a server folder living on another host, scoped to its base directory
pub trait RemoteStorage: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;
    fn is_dir(&self, path: &str) -> Result<bool>;
    /// Paths matching a `dir/*.ext` style pattern
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;
    fn upload(&self, local: &Path, remote: &str) -> Result<()>;
    fn download(&self, remote: &str, local: &Path) -> Result<()>;
    fn remove(&self, path: &str) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    fn mkdir(&self, path: &str) -> Result<()>;
}

#[derive(Clone)]
pub enum ServerFolder {
    Local(PathBuf),
    Remote(Arc<dyn RemoteStorage>),
}

impl std::fmt::Debug for ServerFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerFolder::Local(path) => f.debug_tuple("Local").field(path).finish(),
            ServerFolder::Remote(_) => f.write_str("Remote"),
        }
    }
}

/// Open the folder named by `settings.server_folder`
pub fn open_server_folder(setting: &str) -> Result<ServerFolder> {
    let setting = setting.trim();
    if setting.is_empty() {
        anyhow::bail!("No server folder configured. Set settings.server_folder in the config file.");
    }
    if let Some((scheme, _)) = setting.split_once("://") {
        anyhow::bail!(
            "Server folder '{}' needs a '{}' transport, which this build does not include",
            setting,
            scheme
        );
    }

    let path = PathBuf::from(setting);
    if !path.is_dir() {
        anyhow::bail!("Server folder '{}' does not exist", path.display());
    }
    Ok(ServerFolder::Local(path))
}

impl ServerFolder {
    pub fn is_remote(&self) -> bool {
        matches!(self, ServerFolder::Remote(_))
    }

    fn local_path(root: &Path, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(root.to_path_buf(), |path, part| path.join(part))
    }

    /// Path of `relative` on this machine, if the folder is local
    pub fn local_file(&self, relative: &str) -> Option<PathBuf> {
        match self {
            ServerFolder::Local(root) => Some(Self::local_path(root, relative)),
            ServerFolder::Remote(_) => None,
        }
    }

    pub fn exists(&self, relative: &str) -> Result<bool> {
        match self {
            ServerFolder::Local(root) => Ok(Self::local_path(root, relative).exists()),
            ServerFolder::Remote(storage) => storage.exists(relative),
        }
    }

    pub fn is_dir(&self, relative: &str) -> Result<bool> {
        match self {
            ServerFolder::Local(root) => Ok(Self::local_path(root, relative).is_dir()),
            ServerFolder::Remote(storage) => storage.is_dir(relative),
        }
    }

    /// Where downloads for `relative_dir` are written before they are installed
    pub fn staging_dir(&self, relative_dir: &str, cache_dir: &Path) -> PathBuf {
        match self {
            ServerFolder::Local(root) => Self::local_path(root, relative_dir),
            ServerFolder::Remote(_) => Self::local_path(cache_dir, relative_dir),
        }
    }

    /// File names of the jars directly inside `relative_dir`, sorted
    pub fn list_jars(&self, relative_dir: &str) -> Result<Vec<String>> {
        let mut names = match self {
            ServerFolder::Local(root) => {
                let mut names = Vec::new();
                for entry in fs::read_dir(Self::local_path(root, relative_dir))? {
                    let path = entry?.path();
                    if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jar") {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            names.push(name.to_string());
                        }
                    }
                }
                names
            }
            ServerFolder::Remote(storage) => storage
                .glob(&format!("{}/*.jar", relative_dir.trim_end_matches('/')))?
                .into_iter()
                .filter_map(|path| path.rsplit('/').next().map(str::to_string))
                .collect(),
        };
        names.sort();
        Ok(names)
    }

    /// A local copy of `relative`. Remote files are pulled into `cache_dir`.
    pub fn fetch(&self, relative: &str, cache_dir: &Path) -> Result<PathBuf> {
        match self {
            ServerFolder::Local(root) => Ok(Self::local_path(root, relative)),
            ServerFolder::Remote(storage) => {
                let local = Self::local_path(cache_dir, relative);
                if let Some(parent) = local.parent() {
                    fs::create_dir_all(parent)?;
                }
                storage.download(relative, &local)?;
                Ok(local)
            }
        }
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        match self {
            ServerFolder::Local(root) => {
                fs::rename(Self::local_path(root, from), Self::local_path(root, to))?;
                Ok(())
            }
            ServerFolder::Remote(storage) => storage.rename(from, to),
        }
    }

    /// Put a staged file in place at `relative`, replacing what is there
    pub fn install(&self, staged: &Path, relative: &str) -> Result<()> {
        match self {
            ServerFolder::Local(root) => {
                let target = Self::local_path(root, relative);
                if target != staged {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::rename(staged, &target)?;
                }
                Ok(())
            }
            ServerFolder::Remote(storage) => {
                if let Some((dir, _)) = relative.rsplit_once('/') {
                    if !storage.is_dir(dir)? {
                        storage.mkdir(dir)?;
                    }
                }
                storage.upload(staged, relative)?;
                if let Err(e) = fs::remove_file(staged) {
                    debug!("Could not remove cached {}: {}", staged.display(), e);
                }
                Ok(())
            }
        }
    }

    pub fn remove(&self, relative: &str) -> Result<()> {
        match self {
            ServerFolder::Local(root) => {
                fs::remove_file(Self::local_path(root, relative))?;
                Ok(())
            }
            ServerFolder::Remote(storage) => storage.remove(relative),
        }
    }

    /// Delete a replaced artifact. Failing to do so only warrants a warning.
    pub fn remove_replaced(&self, old: &str, new: &str) {
        if old == new {
            return;
        }
        match self.exists(old) {
            Ok(true) => {
                if let Err(e) = self.remove(old) {
                    warn!("Could not remove old file {}: {}", old, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Could not check old file {}: {}", old, e),
        }
    }
}
