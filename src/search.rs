//! Site-scoped text search through the external provider channels.
//!
//! Each provider is queried over its public HTML results page; hits come back
//! as bare URLs for the resolver to filter. Rate-limit classification lives
//! here, next to the HTTP calls, so callers match on typed errors instead of
//! inspecting message text.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::channels::SearchChannel;
use crate::network::{FetchError, HttpClient, PageFetcher};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The provider is throttling us. Channel-scoped and recoverable.
    #[error("search provider rate limited (status {0})")]
    RateLimited(u16),

    #[error("search request timed out")]
    Timeout,

    #[error("search request failed: {0}")]
    Failed(String),
}

/// Query seam between the resolver and the outside world. An empty Ok result
/// means the provider answered and found nothing - that is a conclusive
/// outcome, not an error.
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(
        &self,
        channel: SearchChannel,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, SearchError>;
}

/// Provider-backed search over public HTML result pages.
pub struct WebSearch {
    http: HttpClient,
}

impl WebSearch {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            http: HttpClient::new(timeout_secs),
        }
    }

    fn query_url(channel: SearchChannel, query: &str) -> String {
        let (endpoint, param) = match channel {
            SearchChannel::Google => ("https://www.google.com/search", "q"),
            SearchChannel::MullvadGoogle => ("https://leta.mullvad.net/search", "q"),
            SearchChannel::Yahoo => ("https://search.yahoo.com/search", "p"),
            SearchChannel::Yandex => ("https://yandex.com/search/", "text"),
        };
        match Url::parse_with_params(endpoint, &[(param, query)]) {
            Ok(url) => url.to_string(),
            Err(_) => endpoint.to_string(),
        }
    }
}

#[async_trait]
impl ProductSearch for WebSearch {
    async fn search(
        &self,
        channel: SearchChannel,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, SearchError> {
        let url = Self::query_url(channel, query);
        tracing::debug!(channel = channel.name(), %url, "search request");

        let response = self.http.fetch(&url).await.map_err(classify)?;
        // Some providers park throttled clients on a 202 holding page.
        if response.status == 202 {
            return Err(SearchError::RateLimited(202));
        }

        let mut links = extract_result_links(&response.body);
        links.truncate(limit);
        tracing::debug!(channel = channel.name(), hits = links.len(), "search results");
        Ok(links)
    }
}

fn classify(error: FetchError) -> SearchError {
    match error {
        FetchError::Timeout => SearchError::Timeout,
        FetchError::Status(status @ (429 | 202)) => SearchError::RateLimited(status),
        other => SearchError::Failed(other.to_string()),
    }
}

/// Pull outbound result URLs from a provider page, in document order,
/// unwrapping the providers' own redirect links and dropping anything that
/// points back at a search engine.
fn extract_result_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("Invalid CSS selector");

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(target) = unwrap_redirect(href.trim()) else {
            continue;
        };
        if is_search_engine_url(&target) {
            continue;
        }
        if !links.contains(&target) {
            links.push(target);
        }
    }
    links
}

/// Google wraps hits as `/url?q=<target>`; Yahoo embeds them as `/RU=<enc>/RK=`.
/// Everything else passes through only if already absolute http(s).
fn unwrap_redirect(href: &str) -> Option<String> {
    if href.starts_with("/url?") || href.contains("google.") && href.contains("/url?") {
        let absolute = if href.starts_with('/') {
            format!("https://www.google.com{href}")
        } else {
            href.to_string()
        };
        let parsed = Url::parse(&absolute).ok()?;
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "q")
            .map(|(_, value)| value.into_owned())
            .filter(|target| target.starts_with("http"));
    }

    if let Some(start) = href.find("/RU=") {
        let encoded = &href[start + 4..];
        let end = encoded.find("/R").unwrap_or(encoded.len());
        let decoded = percent_encoding::percent_decode_str(&encoded[..end])
            .decode_utf8()
            .ok()?;
        if decoded.starts_with("http") {
            return Some(decoded.into_owned());
        }
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    None
}

fn is_search_engine_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    const ENGINE_HOSTS: &[&str] = &[
        "google.",
        "yahoo.",
        "yandex.",
        "mullvad.",
        "bing.",
        "duckduckgo.",
    ];
    ENGINE_HOSTS.iter().any(|fragment| host.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_is_site_scoped() {
        let url = WebSearch::query_url(SearchChannel::Google, "5028965808078 site:argos.co.uk");
        assert!(url.starts_with("https://www.google.com/search?q="));
        assert!(url.contains("site%3Aargos.co.uk"));

        let url = WebSearch::query_url(SearchChannel::Yandex, "abc");
        assert!(url.contains("text=abc"));
    }

    #[test]
    fn test_extract_plain_absolute_links() {
        let html = r#"<html><body>
            <a href="https://www.argos.co.uk/product/123">hit</a>
            <a href="/relative/path">nav</a>
            <a href="javascript:void(0)">junk</a>
        </body></html>"#;
        let links = extract_result_links(html);
        assert_eq!(links, vec!["https://www.argos.co.uk/product/123".to_string()]);
    }

    #[test]
    fn test_unwrap_google_redirect() {
        let target =
            unwrap_redirect("/url?q=https://www.argos.co.uk/product/9511963&sa=U&ved=xyz");
        assert_eq!(
            target,
            Some("https://www.argos.co.uk/product/9511963".to_string())
        );
    }

    #[test]
    fn test_unwrap_yahoo_redirect() {
        let href = "https://r.search.yahoo.com/_ylt=abc/RU=https%3A%2F%2Fwww.argos.co.uk%2Fproduct%2F123/RK=2/RS=xyz";
        let target = unwrap_redirect(href);
        assert_eq!(
            target,
            Some("https://www.argos.co.uk/product/123".to_string())
        );
    }

    #[test]
    fn test_engine_hosts_filtered() {
        let html = r#"<html><body>
            <a href="https://www.google.com/preferences">settings</a>
            <a href="https://www.argos.co.uk/product/123">hit</a>
        </body></html>"#;
        let links = extract_result_links(html);
        assert_eq!(links, vec!["https://www.argos.co.uk/product/123".to_string()]);
    }

    #[test]
    fn test_duplicates_collapse_preserving_order() {
        let html = r#"<html><body>
            <a href="https://www.argos.co.uk/product/1">a</a>
            <a href="https://www.argos.co.uk/product/2">b</a>
            <a href="https://www.argos.co.uk/product/1">a again</a>
        </body></html>"#;
        let links = extract_result_links(html);
        assert_eq!(
            links,
            vec![
                "https://www.argos.co.uk/product/1".to_string(),
                "https://www.argos.co.uk/product/2".to_string(),
            ]
        );
    }
}
