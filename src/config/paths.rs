// Locations of the config file and the local cache

use crate::constants;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    /// `config_file` defaults to `config.yaml` inside `config_dir`
    pub fn new(config_dir: Option<PathBuf>, config_file: Option<PathBuf>) -> Self {
        let config_dir = config_dir.unwrap_or_else(|| PathBuf::from(constants::CONFIG_DIR));
        let config_file = config_file.unwrap_or_else(|| config_dir.join(constants::CONFIG_FILE));
        Self {
            config_dir,
            config_file,
        }
    }

    /// Local staging area used when the server folder lives on a remote host
    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join(constants::CACHE_DIR)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }
}
