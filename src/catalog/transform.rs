use once_cell::sync::Lazy;
use regex::Regex;

use super::types::*;
use crate::excel::{CellValue, SheetTable};

static NON_PRICE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.]").expect("Invalid price regex"));

/// Turn a sheet into catalog records, in sheet order.
///
/// Rows whose brand is blank or leaked from a formula are dropped. The
/// `Imagen_Path` of every record is left empty for the caller to fill.
pub fn transform(table: &SheetTable) -> Result<Vec<TransformedRow>, ConversionError> {
    let product_col = table
        .column_index(PRODUCT_FIELD)
        .ok_or_else(|| ConversionError::MissingColumn(PRODUCT_FIELD.to_string()))?;
    let brand_col = table.column_index(BRAND_FIELD);
    let category_col = table.column_index(CATEGORY_FIELD);

    // Typed over the whole column, dropped rows included
    let prices = resolve_price_column(&table.headers)
        .map(|col| sanitize_price_column(table.rows.iter().map(|row| row.get(col))));

    let mut out = Vec::with_capacity(table.rows.len());

    for (pos, row) in table.rows.iter().enumerate() {
        if let Some(col) = brand_col {
            if is_invalid_brand(&row.get(col).as_text()) {
                continue;
            }
        }

        let (producto, desc_full) = split_title(&row.get(product_col).as_text());

        out.push(TransformedRow {
            row_number: row.row_number,
            record: CatalogRecord {
                marca: brand_col.map(|col| row.get(col).to_json()),
                tipo: category_col.map(|col| row.get(col).to_json()),
                producto,
                desc_full,
                precio_usd: prices.as_ref().map(|p| p[pos]),
                imagen_path: String::new(),
            },
        });
    }

    Ok(out)
}

/// Split a combined product cell into its first line and the rest
pub fn split_title(text: &str) -> (String, String) {
    match text.trim().split_once('\n') {
        Some((title, rest)) => (title.trim().to_string(), rest.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

/// Index of the price column: the canonical header, or else the first
/// header mentioning both "precio" and "usd"
pub fn resolve_price_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| h == PRICE_FIELD).or_else(|| {
        headers.iter().position(|h| {
            let lower = h.to_lowercase();
            lower.contains("precio") && lower.contains("usd")
        })
    })
}

/// Keep only digits and decimal points
pub fn sanitize_price(text: &str) -> String {
    NON_PRICE_CHARS.replace_all(text, "").into_owned()
}

/// Parse a sanitized price, falling back to zero
pub fn parse_price(text: &str) -> f64 {
    sanitize_price(text).parse::<f64>().unwrap_or(0.0)
}

fn sanitize_price_column<'a>(cells: impl Iterator<Item = &'a CellValue>) -> Vec<Price> {
    let cleaned: Vec<String> = cells.map(|cell| sanitize_price(&cell.as_text())).collect();

    let integers: Option<Vec<u64>> = cleaned
        .iter()
        .map(|s| {
            if s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse::<u64>().ok()
            } else {
                None
            }
        })
        .collect();

    match integers {
        Some(values) => values.into_iter().map(Price::Integer).collect(),
        None => cleaned
            .iter()
            .map(|s| Price::Float(s.parse::<f64>().unwrap_or(0.0)))
            .collect(),
    }
}

/// Whether a brand cell marks a row that is not a product
pub fn is_invalid_brand(text: &str) -> bool {
    let s = text.trim();
    s.is_empty() || s.starts_with('=') || s.contains("DISPIMG") || s.eq_ignore_ascii_case("nan")
}
