//! Offline pass: flatten saved product JSON records into a single CSV.

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("input directory not found: {0}")]
    MissingInputDir(String),

    #[error("failed to read records: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write report: {0}")]
    Csv(#[from] csv::Error),
}

/// One flattened product row. Field order is the CSV column order.
#[derive(Debug, Serialize, PartialEq)]
pub struct ReportRow {
    #[serde(rename = "searchTerm")]
    pub search_term: String,
    pub timestamp: String,
    #[serde(rename = "productName")]
    pub product_name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "partNumber")]
    pub part_number: Option<String>,
    pub price_now: Option<f64>,
    pub price_was: Option<f64>,
    #[serde(rename = "flashText")]
    pub flash_text: Option<String>,
    #[serde(rename = "freeDelivery")]
    pub free_delivery: Option<bool>,
    #[serde(rename = "variableDeliveryPrice")]
    pub variable_delivery_price: Option<bool>,
    #[serde(rename = "deliveryPrice")]
    pub delivery_price: Option<f64>,
    pub url: Option<String>,
}

/// Flatten every `.json` record under `input_dir` into `output_csv`.
/// Returns the number of rows written. Unparseable records are skipped with a
/// warning, matching how the scrape side treats bad state files.
pub fn generate_report<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_csv: Q,
) -> Result<usize, ReportError> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(ReportError::MissingInputDir(
            input_dir.display().to_string(),
        ));
    }

    let timestamp = chrono::Local::now().date_naive().to_string();
    let mut rows = Vec::new();

    let mut entries: Vec<_> = fs::read_dir(input_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    for path in &entries {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable record, skipping");
                continue;
            }
        };
        let data: Value = match serde_json::from_str(&contents) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bad JSON record, skipping");
                continue;
            }
        };
        rows.push(flatten_record(&data, path, &timestamp));
    }

    let mut writer = csv::Writer::from_path(output_csv.as_ref())?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(ReportError::Io)?;

    tracing::info!(
        records = entries.len(),
        rows = rows.len(),
        output = %output_csv.as_ref().display(),
        "report written"
    );
    Ok(rows.len())
}

fn flatten_record(data: &Value, path: &Path, timestamp: &str) -> ReportRow {
    // The sanitized filename is the original search term with '/' flattened
    // to '_'; reverse that so the report shows what was searched.
    let search_term = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', "/"))
        .unwrap_or_default();

    let store_data = &data["productStore"]["data"];
    let attributes = &store_data["attributes"];
    let prices = &store_data["prices"]["attributes"];
    let delivery = &prices["delivery"];

    let part_number = attributes["partNumber"].as_str().map(str::to_string);
    let url = part_number
        .as_deref()
        .map(|part| format!("https://www.argos.co.uk/product/{part}"));

    ReportRow {
        search_term,
        timestamp: timestamp.to_string(),
        product_name: store_data["productName"].as_str().map(str::to_string),
        description: attributes["description"].as_str().map(str::to_string),
        part_number,
        price_now: prices["now"].as_f64(),
        price_was: prices["was"].as_f64(),
        flash_text: prices["flashText"].as_str().map(str::to_string),
        free_delivery: delivery["freeDelivery"].as_bool(),
        variable_delivery_price: delivery["variableDeliveryPrice"].as_bool(),
        delivery_price: delivery["deliveryPrice"].as_f64(),
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RECORD: &str = r#"{
        "productStore": {
            "data": {
                "productName": "Tefal Kettle",
                "attributes": {
                    "partNumber": "9511963",
                    "description": "A kettle."
                },
                "prices": {
                    "attributes": {
                        "now": 24.99,
                        "was": 29.99,
                        "delivery": {"freeDelivery": true}
                    }
                }
            }
        }
    }"#;

    #[test]
    fn test_flatten_record() {
        let data: Value = serde_json::from_str(RECORD).unwrap();
        let row = flatten_record(&data, Path::new("scraped/5028965808078.json"), "2026-08-06");

        assert_eq!(row.search_term, "5028965808078");
        assert_eq!(row.product_name.as_deref(), Some("Tefal Kettle"));
        assert_eq!(row.part_number.as_deref(), Some("9511963"));
        assert_eq!(row.price_now, Some(24.99));
        assert_eq!(row.price_was, Some(29.99));
        assert_eq!(row.free_delivery, Some(true));
        assert_eq!(
            row.url.as_deref(),
            Some("https://www.argos.co.uk/product/9511963")
        );
    }

    #[test]
    fn test_filename_underscores_become_slashes() {
        let data: Value = serde_json::from_str("{}").unwrap();
        let row = flatten_record(&data, Path::new("CHP61_100WH.json"), "2026-08-06");
        assert_eq!(row.search_term, "CHP61/100WH");
        assert_eq!(row.product_name, None);
    }

    #[test]
    fn test_generate_report_end_to_end() {
        let input = TempDir::new().unwrap();
        fs::write(input.path().join("5028965808078.json"), RECORD).unwrap();
        fs::write(input.path().join("broken.json"), "{not json").unwrap();
        fs::write(input.path().join("notes.txt"), "ignored").unwrap();

        let output = input.path().join("output.csv");
        let written = generate_report(input.path(), &output).unwrap();
        assert_eq!(written, 1);

        let contents = fs::read_to_string(&output).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("searchTerm,timestamp,productName"));
        assert!(lines.next().unwrap().contains("Tefal Kettle"));
    }

    #[test]
    fn test_missing_input_dir() {
        assert!(matches!(
            generate_report("/no/such/dir", "/tmp/out.csv"),
            Err(ReportError::MissingInputDir(_))
        ));
    }
}
