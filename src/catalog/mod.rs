//! Catalog module: turns parsed workbooks into JSON catalogs and keeps the
//! sources manifest that lists them.

pub mod types;
pub mod transform;
pub mod converter;
pub mod manifest;
pub mod snapshot;

pub use types::*;
pub use transform::transform;
pub use converter::{is_convertible, CatalogConverter};
pub use manifest::{build_entries, ManifestBuilder, MANIFEST_FILE};
pub use snapshot::DirSnapshot;
