use std::path::Path;

use anyhow::{Context, Result};

/// Load the domain list (column `domains`) fully into memory.
pub fn load_domains(path: &Path) -> Result<Vec<String>> {
    load_column(path, "domains")
}

/// Load the product-id list (column `pid`); values are coerced to strings.
pub fn load_product_ids(path: &Path) -> Result<Vec<String>> {
    load_column(path, "pid")
}

/// Read one column of a headered CSV file. Falls back to the first column
/// when the named header is absent. Blank cells are dropped.
fn load_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;

    let index = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .position(|header| header.trim() == column)
        .unwrap_or(0);

    let mut values = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Malformed row in {}", path.display()))?;
        if let Some(value) = record.get(index) {
            let value = value.trim();
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
    }

    Ok(values)
}
