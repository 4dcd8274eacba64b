pub mod catalog;
pub mod config;
pub mod excel;
pub mod watch_loop;

use tracing::info;

use crate::config::Settings;
use crate::watch_loop::{WatchError, WatchLoop};

/// Print the startup banner, convert what is already there, then watch for changes
pub async fn run(settings: Settings) -> Result<(), WatchError> {
    info!("=========================================");
    info!("Catalog watcher starting");
    info!("Folder: {}", settings.watch_dir.display());
    info!("=========================================");

    WatchLoop::new(settings).run().await
}
