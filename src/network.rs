use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::Config;

/// Browser user-agent pool rotated across outbound requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
];

/// Realistic browser header set with a user-agent drawn from the pool.
/// Every outbound request gets a fresh roll so no fixed fingerprint forms.
pub fn browser_headers() -> HeaderMap {
    let ua = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    let mut headers = HeaderMap::new();
    let pairs = [
        ("User-Agent", ua),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-GB,en;q=0.9,en-US;q=0.8"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("DNT", "1"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Cache-Control", "max-age=0"),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Result of a successful fetch. `final_url` reflects any redirects followed.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// Errors that can occur during HTTP fetching.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timeout")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    /// Transient errors are worth one more attempt; the rest are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::Network(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("broken pipe")
                    || msg.contains("connection reset")
            }
            FetchError::Status(status) => *status >= 500,
            FetchError::Body(_) => false,
        }
    }
}

/// The seam the resolver and extractor fetch pages through, so tests can
/// substitute scripted responses for live HTTP.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET a URL, following redirects, and return the final URL plus body.
    /// Non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// Lightweight existence check: HEAD first, GET on ambiguous statuses.
    /// Network errors count as "exists" - a wasted extraction attempt is
    /// cheaper than a false not-found.
    async fn exists(&self, url: &str) -> bool;
}

/// HTTP client tuned for polite single-stream scraping.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout_duration: Duration,
}

impl HttpClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            timeout_duration: Duration::from_secs(timeout_secs),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = timeout(
            self.timeout_duration,
            self.client.get(url).headers(browser_headers()).send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(classify_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        if !response.status().is_success() {
            return Err(FetchError::Status(status));
        }

        let body = timeout(self.timeout_duration, response.text())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(FetchResponse {
            final_url,
            status,
            body,
        })
    }

    async fn head_status(&self, url: &str) -> Result<u16, FetchError> {
        let response = timeout(
            Duration::from_secs(Config::EXISTENCE_CHECK_TIMEOUT_SECS),
            self.client.head(url).headers(browser_headers()).send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(classify_error)?;
        Ok(response.status().as_u16())
    }

    async fn get_status(&self, url: &str) -> Result<u16, FetchError> {
        let response = timeout(
            Duration::from_secs(Config::EXISTENCE_CHECK_TIMEOUT_SECS),
            self.client.get(url).headers(browser_headers()).send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(classify_error)?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch_once(url).await
    }

    async fn exists(&self, url: &str) -> bool {
        match self.head_status(url).await {
            Ok(404) => {
                tracing::info!(url, "page returned 404 on HEAD");
                false
            }
            Ok(200) => true,
            // Ambiguous status: some servers reject HEAD outright, retry as GET.
            Ok(_) => match self.get_status(url).await {
                Ok(404) => {
                    tracing::info!(url, "page returned 404 on GET");
                    false
                }
                Ok(status) => status == 200,
                Err(e) => {
                    tracing::debug!(url, error = %e, "existence check error, assuming page exists");
                    true
                }
            },
            Err(e) => {
                tracing::debug!(url, error = %e, "existence check error, assuming page exists");
                true
            }
        }
    }
}

fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout;
    }
    if let Some(status) = error.status() {
        return FetchError::Status(status.as_u16());
    }
    FetchError::Network(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers_complete() {
        let headers = browser_headers();
        let ua = headers.get("User-Agent").unwrap().to_str().unwrap();
        assert!(USER_AGENTS.contains(&ua));
        assert!(headers.contains_key("Accept"));
        assert!(headers.contains_key("Accept-Language"));
        assert!(headers.contains_key("Accept-Encoding"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(FetchError::Network("connection reset by peer".to_string()).is_retryable());
        assert!(!FetchError::Network("dns failure".to_string()).is_retryable());
        assert!(!FetchError::Body("decode".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let client = HttpClient::new(5);
        let result = client.fetch("not-a-url").await;
        assert!(result.is_err());
    }
}
