use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::types::*;

/// Watches one directory (non-recursively) and forwards change events
pub struct DirectoryWatcher {
    // Dropping the watcher stops notifications
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `dir`; events are delivered on the notify thread into `event_sender`
    pub fn start(
        dir: &Path,
        event_sender: UnboundedSender<FileChangeEvent>,
    ) -> Result<Self, ExcelError> {
        if !dir.is_dir() {
            return Err(ExcelError::file_not_found(&dir.display().to_string()));
        }

        let watched = dir.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for change in classify_event(&event) {
                        // The receiver is gone once the loop is stopping
                        let _ = event_sender.send(change);
                    }
                }
                Err(e) => warn!("Watch error for {}: {}", watched.display(), e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| ExcelError::watch_error(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ExcelError::watch_error(format!("Failed to watch directory: {}", e)))?;

        info!("Watching {} for changes", dir.display());

        Ok(DirectoryWatcher {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Map a raw notify event to one change event per affected path
pub fn classify_event(event: &Event) -> Vec<FileChangeEvent> {
    let change_type = match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) => FileChangeType::Renamed,
        EventKind::Modify(_) | EventKind::Create(_) => FileChangeType::Modified,
        EventKind::Remove(_) => FileChangeType::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| FileChangeEvent {
            path: path.clone(),
            change_type,
        })
        .collect()
}

/// Drops repeat events for the same path inside a time window.
///
/// A zero window lets every event through.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn should_process(&mut self, path: &Path, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }

        if let Some(last) = self.last_seen.get(path) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_seen.insert(path.to_path_buf(), now);
        true
    }
}
