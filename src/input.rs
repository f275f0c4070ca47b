//! Input file loading: two columns, EAN code takes priority over model number.

use std::path::Path;

use crate::models::{LookupKind, ProductId};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read input CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("input CSV must have 'EAN' and 'Model' columns")]
    MissingColumns,
}

/// Each row yields at most one identifier: the EAN when present, else the
/// model number, else the row is skipped with a warning.
pub fn load_products<P: AsRef<Path>>(path: P) -> Result<Vec<ProductId>, InputError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let ean_column = headers
        .iter()
        .position(|h| h.trim() == "EAN")
        .ok_or(InputError::MissingColumns)?;
    let model_column = headers
        .iter()
        .position(|h| h.trim() == "Model")
        .ok_or(InputError::MissingColumns)?;

    let mut products = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let ean = record.get(ean_column).unwrap_or("").trim();
        let model = record.get(model_column).unwrap_or("").trim();

        if !ean.is_empty() {
            products.push(ProductId::new(ean, LookupKind::Code));
        } else if !model.is_empty() {
            products.push(ProductId::new(model, LookupKind::Model));
        } else {
            tracing::warn!(row = index + 2, "row has neither EAN nor model, skipping");
        }
    }

    let code_count = products
        .iter()
        .filter(|p| p.kind == LookupKind::Code)
        .count();
    tracing::info!(
        total = products.len(),
        ean_codes = code_count,
        model_numbers = products.len() - code_count,
        "loaded products from CSV"
    );
    Ok(products)
}
