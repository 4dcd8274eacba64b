use image::ImageFormat;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use umya_spreadsheet::reader;

use super::reader::column_index_to_letter;
use super::types::ExcelError;

/// Header label of the column whose cells carry product pictures
pub const IMAGE_COLUMN_HEADER: &str = "imagen";

/// An image anchored to a worksheet cell
#[derive(Debug, Clone)]
pub struct AnchoredImage {
    /// Top-left anchor cell, e.g. `C5`
    pub coordinate: String,
    pub data: Vec<u8>,
}

/// The parts of the active sheet needed to pull images out of it
#[derive(Debug, Clone, Default)]
pub struct ImageSheet {
    /// Row 1 values, column A first
    pub headers: Vec<String>,
    pub highest_row: u32,
    pub images: Vec<AnchoredImage>,
}

/// What happened to the image found on one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Extracted { row: u32, path: String },
    Failed { row: u32, reason: String },
}

/// Row number to relative image path, plus the per-row outcomes
#[derive(Debug, Clone, Default)]
pub struct ImageExtraction {
    pub index: BTreeMap<u32, String>,
    pub outcomes: Vec<ImageOutcome>,
}

impl ImageExtraction {
    pub fn path_for(&self, row: u32) -> Option<&str> {
        self.index.get(&row).map(String::as_str)
    }

    pub fn extracted_count(&self) -> usize {
        self.index.len()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ImageOutcome::Failed { .. }))
            .count()
    }
}

/// Name of the folder that receives a workbook's images
pub fn image_dir_name(basename: &str) -> String {
    format!("{}_images", basename)
}

/// Extract the images of the `Imagen` column of a workbook into
/// `<output_dir>/<basename>_images/`.
pub fn extract_images(
    workbook_path: &Path,
    output_dir: &Path,
    basename: &str,
) -> Result<ImageExtraction, ExcelError> {
    let image_dir = output_dir.join(image_dir_name(basename));
    fs::create_dir_all(&image_dir).map_err(|e| {
        ExcelError::write_error(format!(
            "Failed to create image folder {}: {}",
            image_dir.display(),
            e
        ))
    })?;

    let sheet = load_image_sheet(workbook_path)?;
    Ok(extract_from_sheet(&sheet, output_dir, basename))
}

/// Read header row, extent and anchored images of the active sheet
pub fn load_image_sheet(path: &Path) -> Result<ImageSheet, ExcelError> {
    let book = reader::xlsx::read(path)
        .map_err(|e| ExcelError::read_error(format!("Failed to open workbook: {}", e)))?;
    let sheet = book.get_active_sheet();

    let (highest_col, highest_row) = sheet.get_highest_column_and_row();
    let headers = (1..=highest_col)
        .map(|col| sheet.get_value((col, 1)))
        .collect();

    let images = sheet
        .get_image_collection()
        .iter()
        .map(|image| AnchoredImage {
            coordinate: image.get_coordinate(),
            data: image.get_image_data().to_vec(),
        })
        .collect();

    Ok(ImageSheet {
        headers,
        highest_row,
        images,
    })
}

/// Walk the image column from row 2 down and write every anchored image as
/// `<basename>_<NNN>.png`, numbering from 1 in row order.
///
/// The image folder must already exist. Failures are recorded per row and
/// never abort the walk.
pub fn extract_from_sheet(
    sheet: &ImageSheet,
    output_dir: &Path,
    basename: &str,
) -> ImageExtraction {
    let mut extraction = ImageExtraction::default();

    let Some(col_idx) = sheet
        .headers
        .iter()
        .position(|h| h.trim().to_lowercase() == IMAGE_COLUMN_HEADER)
    else {
        return extraction;
    };
    let col_letter = column_index_to_letter(col_idx as u32);

    // Later images anchored on the same cell replace earlier ones
    let by_cell: HashMap<&str, &[u8]> = sheet
        .images
        .iter()
        .map(|img| (img.coordinate.as_str(), img.data.as_slice()))
        .collect();

    let folder = image_dir_name(basename);
    let mut counter = 0u32;

    for row in 2..=sheet.highest_row {
        let address = format!("{}{}", col_letter, row);
        let Some(data) = by_cell.get(address.as_str()) else {
            continue;
        };

        let decoded = match image::load_from_memory(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Skipping image at {}: {}", address, e);
                extraction.outcomes.push(ImageOutcome::Failed {
                    row,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        counter += 1;
        let file_name = format!("{}_{:03}.png", basename, counter);
        let out_path = output_dir.join(&folder).join(&file_name);

        match decoded.save_with_format(&out_path, ImageFormat::Png) {
            Ok(()) => {
                let rel_path = format!("{}/{}", folder, file_name);
                info!("Exported image at {} -> {}", address, out_path.display());
                extraction.index.insert(row, rel_path.clone());
                extraction.outcomes.push(ImageOutcome::Extracted { row, path: rel_path });
            }
            Err(e) => {
                warn!("Failed to write image {}: {}", out_path.display(), e);
                extraction.outcomes.push(ImageOutcome::Failed {
                    row,
                    reason: e.to_string(),
                });
            }
        }
    }

    extraction
}
