//! Excel module for reading worksheets, pulling out anchored images, and
//! watching a folder of workbooks.
//!
//! This module provides:
//! - Reading the first sheet as headers plus numbered rows
//! - Extracting product images by anchor cell
//! - Directory change detection

pub mod types;
pub mod reader;
pub mod images;
pub mod watcher;

// Re-export commonly used types and functions
pub use types::*;
pub use reader::read_sheet_table;
pub use images::{extract_images, ImageExtraction, ImageOutcome};
pub use watcher::{classify_event, Debouncer, DirectoryWatcher};
