use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::snapshot::write_atomically;
use super::transform::transform;
use super::types::*;
use crate::excel::{extract_images, read_sheet_table, ImageExtraction};

/// Name prefix of the lock files spreadsheet editors leave next to open workbooks
pub const LOCK_FILE_PREFIX: &str = "~$";
pub const SPREADSHEET_EXTENSION: &str = ".xlsx";

/// Whether a file name is a workbook this converter handles
pub fn is_convertible(file_name: &str) -> bool {
    !file_name.starts_with(LOCK_FILE_PREFIX)
        && file_name.to_lowercase().ends_with(SPREADSHEET_EXTENSION)
}

/// Converts workbooks into `<basename>.json` catalogs inside one output directory
#[derive(Debug, Clone)]
pub struct CatalogConverter {
    output_dir: PathBuf,
}

impl CatalogConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        CatalogConverter {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Convert one workbook and return the name of the JSON file written.
    ///
    /// Returns `None` for files that are not workbooks and for conversions
    /// that failed; failures are logged and never propagate.
    pub fn convert(&self, path: &Path) -> Option<String> {
        match self.try_convert(path) {
            Ok(Some(report)) => {
                info!(
                    "Finished {} ({} records, {} rows dropped, {} images)",
                    report.output_file,
                    report.records,
                    report.dropped_rows,
                    report.images.len()
                );
                Some(report.output_file)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to convert {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Convert one workbook, reporting errors to the caller.
    ///
    /// `Ok(None)` means the file is not a convertible workbook.
    pub fn try_convert(&self, path: &Path) -> Result<Option<ConversionReport>, ConversionError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        if !is_convertible(file_name) {
            return Ok(None);
        }
        let Some(basename) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };

        info!("Converting workbook {}", file_name);

        // The workbook readers panic on some malformed files
        panic::catch_unwind(AssertUnwindSafe(|| self.convert_workbook(path, basename)))
            .map_err(|payload| ConversionError::ReaderPanic(panic_message(payload.as_ref())))?
            .map(Some)
    }

    fn convert_workbook(
        &self,
        path: &Path,
        basename: &str,
    ) -> Result<ConversionReport, ConversionError> {
        // Images come from the raw workbook, values from the parsed sheet
        let images = extract_images(path, &self.output_dir, basename)?;
        let table = read_sheet_table(path)?;
        let rows = transform(&table)?;

        let dropped_rows = table.rows.len() - rows.len();
        let records = merge_image_paths(rows, &images);

        let output_file = format!("{}.json", basename);
        let json = serde_json::to_string_pretty(&records)?;
        write_atomically(&self.output_dir.join(&output_file), json.as_bytes())?;

        Ok(ConversionReport {
            output_file,
            records: records.len(),
            dropped_rows,
            images: images.outcomes,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Attach each record's image by the spreadsheet row it came from
pub fn merge_image_paths(
    rows: Vec<TransformedRow>,
    images: &ImageExtraction,
) -> Vec<CatalogRecord> {
    rows.into_iter()
        .map(|row| {
            let mut record = row.record;
            record.imagen_path = images
                .path_for(row.row_number)
                .unwrap_or_default()
                .to_string();
            record
        })
        .collect()
}
