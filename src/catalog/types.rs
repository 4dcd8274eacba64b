use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::excel::{ExcelError, ImageOutcome};

pub const BRAND_FIELD: &str = "MARCA";
pub const CATEGORY_FIELD: &str = "TIPO";
pub const PRODUCT_FIELD: &str = "PRODUCTO";
pub const DESCRIPTION_FIELD: &str = "DESC_FULL";
pub const PRICE_FIELD: &str = "Precio ( USD )";
pub const IMAGE_PATH_FIELD: &str = "Imagen_Path";

/// A sanitized price.
///
/// A price column whose cells are all plain digit strings stays integral;
/// anything else makes the whole column fractional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Price {
    Integer(u64),
    Float(f64),
}

/// One catalog entry as the viewer reads it.
///
/// Field order is the output order. `MARCA`, `TIPO` and the price are left
/// out entirely when the source sheet has no such column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    #[serde(rename = "MARCA", skip_serializing_if = "Option::is_none")]
    pub marca: Option<Value>,
    #[serde(rename = "TIPO", skip_serializing_if = "Option::is_none")]
    pub tipo: Option<Value>,
    #[serde(rename = "PRODUCTO")]
    pub producto: String,
    #[serde(rename = "DESC_FULL")]
    pub desc_full: String,
    #[serde(rename = "Precio ( USD )", skip_serializing_if = "Option::is_none")]
    pub precio_usd: Option<Price>,
    #[serde(rename = "Imagen_Path")]
    pub imagen_path: String,
}

/// A record together with the spreadsheet row it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub row_number: u32,
    pub record: CatalogRecord,
}

/// Entry of the sources manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub label: String,
    pub desc: String,
    pub file: String,
}

/// Summary of one successful conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output_file: String,
    pub records: usize,
    pub dropped_rows: usize,
    pub images: Vec<ImageOutcome>,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Excel(#[from] ExcelError),
    #[error("Missing required column '{0}'")]
    MissingColumn(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize records: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Workbook reader panicked: {0}")]
    ReaderPanic(String),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_field_order_and_omissions() {
        let record = CatalogRecord {
            marca: Some(json!("Acme")),
            tipo: None,
            producto: "Widget".to_string(),
            desc_full: "A great widget".to_string(),
            precio_usd: Some(Price::Float(19.99)),
            imagen_path: String::new(),
        };

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"MARCA":"Acme","PRODUCTO":"Widget","DESC_FULL":"A great widget","Precio ( USD )":19.99,"Imagen_Path":""}"#
        );
    }

    #[test]
    fn test_present_but_empty_category_is_null() {
        let record = CatalogRecord {
            marca: Some(json!("Acme")),
            tipo: Some(Value::Null),
            producto: "Widget".to_string(),
            desc_full: String::new(),
            precio_usd: None,
            imagen_path: String::new(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["TIPO"], Value::Null);
        assert!(value.get("Precio ( USD )").is_none());
    }

    #[test]
    fn test_price_serialization() {
        assert_eq!(serde_json::to_string(&Price::Integer(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&Price::Float(5.0)).unwrap(), "5.0");
        assert_eq!(serde_json::to_string(&Price::Float(1234.56)).unwrap(), "1234.56");
    }
}
