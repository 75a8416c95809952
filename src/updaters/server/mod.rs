// Server updaters

use super::Updater;
use std::sync::Arc;

pub mod bungee;
pub mod custom;
pub mod paper;
pub mod purpur;

pub use bungee::BungeeUpdater;
pub use custom::CustomServerUpdater;
pub use paper::PaperUpdater;
pub use purpur::PurpurUpdater;

pub fn builtin() -> Vec<Arc<dyn Updater>> {
    vec![
        Arc::new(PaperUpdater::default()),
        Arc::new(PurpurUpdater::default()),
        Arc::new(BungeeUpdater::default()),
        Arc::new(CustomServerUpdater),
    ]
}
