use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::path::PathBuf;

use crate::catalog::MANIFEST_FILE;

/// Prefix of the environment variables read by [`Settings::load`]
pub const ENV_PREFIX: &str = "CATALOG_WATCH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Folder holding the workbooks; catalogs, images and the manifest are written here too
    pub watch_dir: PathBuf,
    pub manifest_file: String,
    /// Repeat events for one file within this window are ignored; 0 turns it off
    pub debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            watch_dir: PathBuf::from("."),
            manifest_file: MANIFEST_FILE.to_string(),
            debounce_ms: 0,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `CATALOG_WATCH_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        Config::builder()
            .set_default("watch_dir", defaults.watch_dir.to_string_lossy().to_string())?
            .set_default("manifest_file", defaults.manifest_file)?
            .set_default("debounce_ms", defaults.debounce_ms)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
