use std::path::{Path, PathBuf};
use tracing::info;

use super::snapshot::{write_atomically, DirSnapshot};
use super::types::{ManifestEntry, ManifestError};

/// Default name of the manifest inside the output directory
pub const MANIFEST_FILE: &str = "sources.json";
/// Master stock catalog, always listed first
pub const STOCK_FILE: &str = "data.json";
/// Current price list, listed right after the stock catalog
pub const CURRENT_LIST_FILE: &str = "products.json";

impl ManifestEntry {
    pub fn stock() -> Self {
        ManifestEntry {
            key: "stock".to_string(),
            label: "STOCK".to_string(),
            desc: "Catálogo de stock actual".to_string(),
            file: STOCK_FILE.to_string(),
        }
    }

    pub fn current_list() -> Self {
        ManifestEntry {
            key: "lista_actual".to_string(),
            label: "LISTA ACTUAL".to_string(),
            desc: "Lista actual".to_string(),
            file: CURRENT_LIST_FILE.to_string(),
        }
    }

    /// Entry for any other catalog, named after its file stem
    pub fn generic(file_name: &str) -> Self {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);

        ManifestEntry {
            key: stem.to_lowercase(),
            label: stem.to_uppercase(),
            desc: stem.to_string(),
            file: file_name.to_string(),
        }
    }
}

/// List every JSON catalog of a directory snapshot for the viewer
pub fn build_entries(snapshot: &DirSnapshot, manifest_file: &str) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    let mut current_list = None;
    let mut others = Vec::new();

    if snapshot.contains(STOCK_FILE) {
        entries.push(ManifestEntry::stock());
    }

    for name in snapshot.files() {
        if !name.to_lowercase().ends_with(".json") || name == manifest_file || name == STOCK_FILE {
            continue;
        }
        if name.eq_ignore_ascii_case(CURRENT_LIST_FILE) {
            current_list = Some(ManifestEntry::current_list());
            continue;
        }
        others.push(ManifestEntry::generic(name));
    }

    entries.extend(current_list);
    entries.extend(others);
    entries
}

/// Writes the manifest of one output directory
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    output_dir: PathBuf,
    manifest_file: String,
}

impl ManifestBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, manifest_file: impl Into<String>) -> Self {
        ManifestBuilder {
            output_dir: output_dir.into(),
            manifest_file: manifest_file.into(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_file)
    }

    /// Rescan the output directory and rewrite the manifest
    pub fn build(&self) -> Result<Vec<ManifestEntry>, ManifestError> {
        let snapshot = DirSnapshot::read(&self.output_dir)?;
        self.write(&snapshot)
    }

    /// Rewrite the manifest from an existing snapshot
    pub fn write(&self, snapshot: &DirSnapshot) -> Result<Vec<ManifestEntry>, ManifestError> {
        let entries = build_entries(snapshot, &self.manifest_file);
        let json = serde_json::to_string_pretty(&entries)?;
        write_atomically(&self.manifest_path(), json.as_bytes())?;

        info!("Manifest {} updated ({} sources)", self.manifest_file, entries.len());
        Ok(entries)
    }
}
