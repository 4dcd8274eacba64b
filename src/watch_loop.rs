use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::catalog::{is_convertible, CatalogConverter, DirSnapshot, ManifestBuilder};
use crate::config::Settings;
use crate::excel::{Debouncer, DirectoryWatcher, ExcelError, FileChangeEvent, FileChangeType};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Watcher(#[from] ExcelError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Scanning,
    Watching,
    Converting,
    Stopping,
}

/// Result of the startup pass over the watch directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub workbooks: usize,
    pub converted: Vec<String>,
    pub manifest_entries: usize,
}

/// Converter plus manifest, shared by the startup scan and the event path
#[derive(Debug, Clone)]
pub struct Pipeline {
    converter: CatalogConverter,
    manifest: ManifestBuilder,
}

impl Pipeline {
    pub fn new(settings: &Settings) -> Self {
        Pipeline {
            converter: CatalogConverter::new(&settings.watch_dir),
            manifest: ManifestBuilder::new(&settings.watch_dir, settings.manifest_file.clone()),
        }
    }

    /// Convert every workbook of the snapshot, then always rebuild the manifest
    pub fn scan(&self, snapshot: &DirSnapshot) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for name in snapshot.files().iter().filter(|n| is_convertible(n)) {
            summary.workbooks += 1;
            if let Some(output) = self.converter.convert(&snapshot.path_of(name)) {
                summary.converted.push(output);
            }
        }

        summary.manifest_entries = self.rebuild_manifest();
        summary
    }

    /// Reconvert one changed workbook and republish the manifest if it produced output
    pub fn on_change(&self, path: &Path) -> Option<String> {
        let output = self.converter.convert(path)?;
        self.rebuild_manifest();
        Some(output)
    }

    fn rebuild_manifest(&self) -> usize {
        match self.manifest.build() {
            Ok(entries) => entries.len(),
            Err(e) => {
                error!(
                    "Failed to write manifest {}: {}",
                    self.manifest.manifest_path().display(),
                    e
                );
                0
            }
        }
    }
}

/// Whether a change event should trigger a conversion
pub fn is_relevant(event: &FileChangeEvent) -> bool {
    event.change_type == FileChangeType::Modified
        && !event.path.is_dir()
        && event
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(is_convertible)
            .unwrap_or(false)
}

fn log_interrupt(res: std::io::Result<()>) {
    if let Err(e) = res {
        warn!("Failed to listen for interrupt: {}", e);
    }
    info!("Interrupt received, stopping");
}

/// Startup scan followed by change-driven reconversion until Ctrl-C
pub struct WatchLoop {
    settings: Settings,
    pipeline: Pipeline,
    state: LoopState,
}

impl WatchLoop {
    pub fn new(settings: Settings) -> Self {
        let pipeline = Pipeline::new(&settings);
        WatchLoop {
            settings,
            pipeline,
            state: LoopState::Starting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Convert what is already in the directory and write the manifest once
    pub async fn initial_scan(&mut self) -> Result<ScanSummary, WatchError> {
        self.state = LoopState::Scanning;

        let dir = self.settings.watch_dir.clone();
        let snapshot =
            DirSnapshot::read(&dir).map_err(|source| WatchError::Scan { path: dir, source })?;
        let pipeline = self.pipeline.clone();
        let summary = tokio::task::spawn_blocking(move || pipeline.scan(&snapshot)).await?;

        info!(
            "Initial scan finished: {} of {} workbooks converted, {} sources listed",
            summary.converted.len(),
            summary.workbooks,
            summary.manifest_entries
        );
        Ok(summary)
    }

    /// Run until interrupted. Conversions run one at a time, in event order.
    pub async fn run(self) -> Result<(), WatchError> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run until `shutdown` resolves. The startup scan is abandoned if it comes first.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            biased;
            res = &mut shutdown => {
                log_interrupt(res);
                return Ok(());
            }
            scan = self.initial_scan() => {
                scan?;
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DirectoryWatcher::start(&self.settings.watch_dir, tx)?;
        self.state = LoopState::Watching;
        info!("Listening for workbook changes in {}", watcher.dir().display());

        let mut debouncer = Debouncer::new(Duration::from_millis(self.settings.debounce_ms));

        loop {
            tokio::select! {
                res = &mut shutdown => {
                    log_interrupt(res);
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        warn!("Watcher channel closed, stopping");
                        break;
                    };
                    self.handle_event(event, &mut debouncer).await;
                }
            }
        }

        self.state = LoopState::Stopping;
        drop(watcher);
        info!("Watcher stopped");
        Ok(())
    }

    async fn handle_event(&mut self, event: FileChangeEvent, debouncer: &mut Debouncer) {
        if !is_relevant(&event) {
            debug!("Ignoring {:?} on {}", event.change_type, event.path.display());
            return;
        }
        if !debouncer.should_process(&event.path, Instant::now()) {
            debug!("Debounced change on {}", event.path.display());
            return;
        }

        self.state = LoopState::Converting;
        let pipeline = self.pipeline.clone();
        let path = event.path;
        if let Err(e) = tokio::task::spawn_blocking(move || pipeline.on_change(&path)).await {
            error!("Conversion task failed: {}", e);
        }
        self.state = LoopState::Watching;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConversionError;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use std::fs;
    use std::io::{Read, Write};

    fn write_workbook(path: &Path, rows: &[&[&str]]) {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet
                    .get_cell_mut((c as u32 + 1, r as u32 + 1))
                    .set_value(value.to_string());
            }
        }
        umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
    }

    /// Rewrite a workbook with the `sheetId` attributes stripped from `xl/workbook.xml`
    fn strip_sheet_ids(path: &Path) {
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut parts = Vec::new();
        for i in 0..archive.len() {
            let mut part = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            part.read_to_end(&mut data).unwrap();
            parts.push((part.name().to_string(), data));
        }
        drop(archive);

        let sheet_id = Regex::new(r#"\s+sheetId="\d+""#).unwrap();
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, data) in parts {
            let data = if name == "xl/workbook.xml" {
                let xml = String::from_utf8(data).unwrap();
                assert!(sheet_id.is_match(&xml));
                sheet_id.replace_all(&xml, "").into_owned().into_bytes()
            } else {
                data
            };
            writer
                .start_file(name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(&data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn settings_for(dir: &Path) -> Settings {
        Settings {
            watch_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    fn modified(path: PathBuf) -> FileChangeEvent {
        FileChangeEvent {
            path,
            change_type: FileChangeType::Modified,
        }
    }

    #[test]
    fn test_is_relevant() {
        assert!(is_relevant(&modified(PathBuf::from("/watch/Stock.xlsx"))));
        assert!(!is_relevant(&modified(PathBuf::from("/watch/~$Stock.xlsx"))));
        assert!(!is_relevant(&modified(PathBuf::from("/watch/Stock.json"))));
        assert!(!is_relevant(&FileChangeEvent {
            path: PathBuf::from("/watch/Stock.xlsx"),
            change_type: FileChangeType::Deleted,
        }));
    }

    #[test]
    fn test_directories_are_not_relevant() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Archive.xlsx");
        fs::create_dir(&folder).unwrap();
        assert!(!is_relevant(&modified(folder)));
    }

    #[test]
    fn test_scan_converts_workbooks_and_always_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_workbook(
            &dir.path().join("promo.xlsx"),
            &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]],
        );
        write_workbook(
            &dir.path().join("~$promo.xlsx"),
            &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]],
        );
        write_workbook(&dir.path().join("roto.xlsx"), &[&["MARCA"], &["Acme"]]);
        fs::write(dir.path().join("data.json"), "[]").unwrap();

        let pipeline = Pipeline::new(&settings_for(dir.path()));
        let summary = pipeline.scan(&DirSnapshot::read(dir.path()).unwrap());

        assert_eq!(summary.workbooks, 2);
        assert_eq!(summary.converted, vec!["promo.json".to_string()]);
        assert_eq!(summary.manifest_entries, 2);
        assert!(dir.path().join("sources.json").exists());
        assert!(!dir.path().join("roto.json").exists());
    }

    #[test]
    fn test_scan_of_empty_directory_still_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&settings_for(dir.path()));

        let summary = pipeline.scan(&DirSnapshot::read(dir.path()).unwrap());

        assert_eq!(summary, ScanSummary::default());
        assert_eq!(fs::read_to_string(dir.path().join("sources.json")).unwrap(), "[]");
    }

    #[test]
    fn test_panicking_reader_is_a_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.xlsx");
        write_workbook(&path, &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]]);
        strip_sheet_ids(&path);

        let err = CatalogConverter::new(dir.path()).try_convert(&path).unwrap_err();

        assert!(matches!(err, ConversionError::ReaderPanic(_)));
        assert!(!dir.path().join("roto.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_workbook_does_not_stop_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("a_bad.xlsx");
        write_workbook(&bad, &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]]);
        strip_sheet_ids(&bad);
        write_workbook(
            &dir.path().join("b_good.xlsx"),
            &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]],
        );

        let mut watch_loop = WatchLoop::new(settings_for(dir.path()));
        let summary = watch_loop.initial_scan().await.unwrap();

        assert_eq!(summary.workbooks, 2);
        assert_eq!(summary.converted, vec!["b_good.json".to_string()]);
        assert!(dir.path().join("b_good.json").exists());
        assert!(!dir.path().join("a_bad.json").exists());
        let manifest = fs::read_to_string(dir.path().join("sources.json")).unwrap();
        assert!(manifest.contains("\"b_good.json\""));
    }

    #[test]
    fn test_failed_change_leaves_manifest_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.xlsx");
        write_workbook(&path, &[&["MARCA"], &["Acme"]]);

        let pipeline = Pipeline::new(&settings_for(dir.path()));

        assert_eq!(pipeline.on_change(&path), None);
        assert!(!dir.path().join("sources.json").exists());
    }

    #[test]
    fn test_change_rebuilds_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Lista.xlsx");
        write_workbook(&path, &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]]);

        let pipeline = Pipeline::new(&settings_for(dir.path()));

        assert_eq!(pipeline.on_change(&path), Some("Lista.json".to_string()));
        let manifest = fs::read_to_string(dir.path().join("sources.json")).unwrap();
        assert!(manifest.contains("\"lista\""));
        assert!(manifest.contains("\"LISTA\""));
    }

    #[tokio::test]
    async fn test_initial_scan_moves_to_scanning() {
        let dir = tempfile::tempdir().unwrap();
        write_workbook(
            &dir.path().join("Stock.xlsx"),
            &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]],
        );

        let mut watch_loop = WatchLoop::new(settings_for(dir.path()));
        assert_eq!(watch_loop.state(), LoopState::Starting);

        let summary = watch_loop.initial_scan().await.unwrap();

        assert_eq!(watch_loop.state(), LoopState::Scanning);
        assert_eq!(summary.converted, vec!["Stock.json".to_string()]);
    }

    #[tokio::test]
    async fn test_initial_scan_of_missing_directory_fails() {
        let mut watch_loop = WatchLoop::new(settings_for(Path::new("/nonexistent/catalogos")));
        let err = watch_loop.initial_scan().await.unwrap_err();
        assert!(matches!(err, WatchError::Scan { .. }));
    }

    #[tokio::test]
    async fn test_interrupt_before_scan_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        write_workbook(
            &dir.path().join("Stock.xlsx"),
            &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]],
        );

        let watch_loop = WatchLoop::new(settings_for(dir.path()));
        watch_loop
            .run_until(std::future::ready(Ok(())))
            .await
            .unwrap();

        assert!(!dir.path().join("Stock.json").exists());
        assert!(!dir.path().join("sources.json").exists());
    }

    #[tokio::test]
    async fn test_handle_event_converts_and_returns_to_watching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Stock.xlsx");
        write_workbook(&path, &[&["MARCA", "PRODUCTO"], &["Acme", "Widget"]]);

        let mut watch_loop = WatchLoop::new(settings_for(dir.path()));
        let mut debouncer = Debouncer::new(Duration::ZERO);
        watch_loop.handle_event(modified(path), &mut debouncer).await;

        assert_eq!(watch_loop.state(), LoopState::Watching);
        assert!(dir.path().join("Stock.json").exists());
        assert!(dir.path().join("sources.json").exists());
    }
}
