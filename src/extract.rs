//! Fetches a resolved product page and persists its embedded product JSON.
//!
//! Argos pages ship their product record as a serialized store in a script
//! tag (`window.__data` on current pages, `window.__PRELOADED_STATE__` on
//! older ones) with a JSON-LD block as a last resort.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::ProductId;
use crate::network::{FetchError, FetchResponse, PageFetcher};
use crate::visited::VisitedUrls;

lazy_static! {
    static ref DATA_PATTERN: Regex =
        Regex::new(r"(?s)window\.__data\s*=\s*(\{.*\})").expect("data pattern");
    static ref PRELOADED_PATTERN: Regex =
        Regex::new(r"(?s)window\.__PRELOADED_STATE__\s*=\s*(\{.*\})").expect("preloaded pattern");
    static ref TRAILING_OBJECT_COMMA: Regex = Regex::new(r",\s*\}").expect("comma pattern");
    static ref TRAILING_ARRAY_COMMA: Regex = Regex::new(r",\s*\]").expect("comma pattern");
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("URL was already visited by an earlier pass")]
    AlreadyVisited,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no product data payload found on page")]
    NoPayload,

    #[error("product payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write product record: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a resolved URL into a saved per-product JSON record.
pub struct Extractor {
    fetcher: Arc<dyn PageFetcher>,
    output_dir: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl Extractor {
    pub fn new<P: AsRef<Path>>(fetcher: Arc<dyn PageFetcher>, output_dir: P) -> Self {
        Self::with_retry(
            fetcher,
            output_dir,
            Config::FETCH_ATTEMPTS,
            Duration::from_secs(Config::RETRY_DELAY_SECS),
        )
    }

    pub fn with_retry<P: AsRef<Path>>(
        fetcher: Arc<dyn PageFetcher>,
        output_dir: P,
        attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.as_ref().to_path_buf(),
            attempts,
            retry_delay,
        }
    }

    /// Scrape and save one product. The bool is the only signal the batch
    /// driver consumes; details go to the log.
    pub async fn scrape(
        &self,
        visited: &mut VisitedUrls,
        product: &ProductId,
        url: &str,
    ) -> bool {
        match self.try_scrape(visited, product, url).await {
            Ok(path) => {
                tracing::info!(id = %product.value, path = %path.display(), "saved product record");
                true
            }
            Err(e) => {
                tracing::warn!(id = %product.value, url, error = %e, "product scrape failed");
                false
            }
        }
    }

    async fn try_scrape(
        &self,
        visited: &mut VisitedUrls,
        product: &ProductId,
        url: &str,
    ) -> Result<PathBuf, ExtractError> {
        if visited.has_visited(url) {
            return Err(ExtractError::AlreadyVisited);
        }
        visited.mark_visited(url);

        let response = self.fetch_with_retry(url).await?;
        let data = extract_product_data(&response.body).ok_or(ExtractError::NoPayload)?;

        fs::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}.json", product.sanitized()));
        fs::write(&path, serde_json::to_string_pretty(&data)?)?;
        Ok(path)
    }

    /// Bounded retry loop; the delay is injected so tests run with zero.
    async fn fetch_with_retry(&self, url: &str) -> Result<FetchResponse, ExtractError> {
        let mut last_error = None;
        for attempt in 0..self.attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.fetcher.fetch(url).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(url, attempt = attempt + 1, error = %e, "page fetch failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error
            .unwrap_or_else(|| FetchError::Network("max retries exceeded".to_string()))
            .into())
    }
}

/// Pull the product JSON out of the page. Tries the serialized data stores
/// first, then JSON-LD.
pub fn extract_product_data(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script").expect("Invalid CSS selector");

    let mut store_script = None;
    for element in document.select(&script_selector) {
        let text: String = element.text().collect();
        if text.contains("window.__data") || text.contains("window.__PRELOADED_STATE__") {
            store_script = Some(text);
            break;
        }
    }

    if let Some(script) = store_script {
        return parse_store_script(&script);
    }

    // JSON-LD fallback: a Product object wrapped the same way the store
    // payloads are, so the report pass reads one shape.
    let ld_selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("Invalid CSS selector");
    for element in document.select(&ld_selector) {
        let text: String = element.text().collect();
        if let Ok(data) = serde_json::from_str::<Value>(&text) {
            if data.get("@type").and_then(Value::as_str) == Some("Product") {
                tracing::info!("found product data in JSON-LD format");
                return Some(serde_json::json!({ "product": data }));
            }
        }
    }

    None
}

fn parse_store_script(script: &str) -> Option<Value> {
    let json_text = DATA_PATTERN
        .captures(script)
        .or_else(|| PRELOADED_PATTERN.captures(script))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            // Last resort: widest braced span in the script.
            let start = script.find('{')?;
            let end = script.rfind('}')?;
            (end > start).then(|| script[start..=end].to_string())
        })?;

    let cleaned = clean_json_text(&json_text);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "embedded product JSON failed to parse");
            None
        }
    }
}

/// The serialized store is JavaScript, not strict JSON: `undefined` values
/// and trailing commas have to go before serde sees it.
fn clean_json_text(text: &str) -> String {
    let text = text.replace(":undefined", ":null");
    let text = TRAILING_OBJECT_COMMA.replace_all(&text, "}");
    TRAILING_ARRAY_COMMA.replace_all(&text, "]").into_owned()
}
