// Plugin updaters

use super::Updater;
use std::sync::Arc;

pub mod bukkit;
pub mod custom;
pub mod github;
pub mod hangar;
pub mod jenkins;
pub mod modrinth;
pub mod spigot;

pub use bukkit::BukkitUpdater;
pub use custom::CustomUrlUpdater;
pub use github::GithubUpdater;
pub use hangar::HangarUpdater;
pub use jenkins::JenkinsUpdater;
pub use modrinth::ModrinthUpdater;
pub use spigot::SpigotUpdater;

/// Built-in plugin updaters in their default try order
pub fn builtin() -> Vec<Arc<dyn Updater>> {
    vec![
        Arc::new(GithubUpdater::default()),
        Arc::new(JenkinsUpdater),
        Arc::new(ModrinthUpdater::default()),
        Arc::new(HangarUpdater::default()),
        Arc::new(SpigotUpdater::default()),
        Arc::new(BukkitUpdater::default()),
        Arc::new(CustomUrlUpdater),
    ]
}
