// Init command for writing a fresh config file

use super::Workspace;
use crate::config::Config;
use crate::ui;
use std::path::PathBuf;

pub fn init(workspace: &Workspace, server_folder: Option<PathBuf>) -> anyhow::Result<()> {
    let path = workspace.paths.config_file();
    if path.exists() {
        ui::dim(&format!(
            "Config detected at {}. Skipping initialization.",
            path.display()
        ));
        return Ok(());
    }

    let mut config = Config::from_value(path, workspace.schema.default_config().clone());
    if let Some(folder) = server_folder {
        let folder = std::path::absolute(&folder).unwrap_or(folder);
        config.set(
            "settings.server_folder",
            folder.to_string_lossy().into_owned(),
        );
    }
    config.save()?;

    ui::success(&format!("Initialized {}", path.display()));
    if config.get_str("settings.server_folder").is_none() {
        ui::action("Set settings.server_folder before the first run");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Paths;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_defaults_once() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::new(Paths::new(Some(temp_dir.path().to_path_buf()), None)).unwrap();

        init(&workspace, Some(PathBuf::from("/srv/minecraft"))).unwrap();
        let config = workspace.load_config().unwrap();
        assert_eq!(
            config.get_str("settings.server_folder").as_deref(),
            Some("/srv/minecraft")
        );
        assert!(config.get("updater_settings.plugin.github").is_some());

        std::fs::write(workspace.paths.config_file(), "settings: {}\n").unwrap();
        init(&workspace, None).unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.paths.config_file()).unwrap(),
            "settings: {}\n"
        );
    }
}
