//! Resolves a product identifier to at most one live Argos product URL.
//!
//! Code lookups rotate across the external search channels, skipping blocked
//! ones and backing off failing ones. Model lookups go straight to the Argos
//! site search. Rotation exists to recover from rate limits only: the first
//! channel that answers conclusively - with results or without - settles the
//! identifier.

use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::channels::ChannelHealth;
use crate::config::Config;
use crate::models::{LookupKind, ProductId};
use crate::network::PageFetcher;
use crate::pacing::Pacer;
use crate::search::{ProductSearch, SearchError};
use crate::visited::VisitedUrls;

pub const SITE_HOST: &str = "argos.co.uk";
const SITE_BASE: &str = "https://www.argos.co.uk";

lazy_static! {
    static ref PRODUCT_PATH: Regex =
        Regex::new(r"/product/\d+").expect("product path pattern");
    static ref PRODUCT_SLUG_PATH: Regex =
        Regex::new(r"/product/[a-zA-Z0-9-]+/\d+").expect("product slug pattern");
}

const EXCLUDED_SEGMENTS: &[&str] = &["/search/", "/browse/", "/category/", "/c:", "/static/"];

// Path-segment encode set: what a browser escapes inside one segment.
const SEGMENT_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Outcome of one identifier lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A live product page URL.
    Resolved(String),
    /// Conclusively absent from the site; never retried in later runs.
    NotFound,
    /// Every search channel is inside its block cooldown. Code lookups only.
    AllChannelsBlocked,
}

/// True for URLs shaped like an Argos product page and not shaped like a
/// listing or asset path.
pub fn is_valid_product_url(url: &str) -> bool {
    if url.is_empty() || !url.contains(SITE_HOST) {
        return false;
    }
    if EXCLUDED_SEGMENTS.iter().any(|segment| url.contains(segment)) {
        return false;
    }
    PRODUCT_PATH.is_match(url) || PRODUCT_SLUG_PATH.is_match(url)
}

/// Drop tracking query parameters.
pub fn strip_tracking(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Search hits -> ordered, de-duplicated product-page candidates.
pub fn filter_candidates(results: &[String]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for url in results {
        let clean = strip_tracking(url).to_string();
        if is_valid_product_url(&clean) && !candidates.contains(&clean) {
            candidates.push(clean);
        }
    }
    candidates
}

/// The resolution engine: owns the channel health map, the pacer, and the
/// visited-URL registry. Constructed once per process from the persisted
/// snapshot; the batch driver reads the state back out for saving.
pub struct Resolver {
    fetcher: Arc<dyn PageFetcher>,
    search: Arc<dyn ProductSearch>,
    pacer: Pacer,
    health: ChannelHealth,
    visited: VisitedUrls,
    consecutive_failures: u32,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        search: Arc<dyn ProductSearch>,
        health: ChannelHealth,
        visited: VisitedUrls,
    ) -> Self {
        Self::with_pacer(fetcher, search, health, visited, Pacer::new())
    }

    pub fn with_pacer(
        fetcher: Arc<dyn PageFetcher>,
        search: Arc<dyn ProductSearch>,
        health: ChannelHealth,
        visited: VisitedUrls,
        pacer: Pacer,
    ) -> Self {
        Self {
            fetcher,
            search,
            pacer,
            health,
            visited,
            consecutive_failures: 0,
        }
    }

    pub fn health(&self) -> &ChannelHealth {
        &self.health
    }

    pub fn visited(&self) -> &VisitedUrls {
        &self.visited
    }

    pub fn visited_mut(&mut self) -> &mut VisitedUrls {
        &mut self.visited
    }

    /// Rate-limit hits across all channels since the last conclusive outcome.
    /// The batch driver trips a long cooldown when this passes its threshold.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One full block-cooldown sleep; used by the driver's circuit breaker.
    pub async fn forced_cooldown(&mut self) {
        self.pacer.wait(None, 0, true, false).await;
        self.consecutive_failures = 0;
    }

    /// Spacing before handing a resolved URL to the extractor.
    pub async fn pace_before_scrape(&mut self) {
        self.pacer.wait(Some("scrape"), 0, false, false).await;
    }

    pub async fn resolve(&mut self, product: &ProductId) -> Resolution {
        tracing::info!(
            id = %product.value,
            kind = product.kind.label(),
            "resolving product URL"
        );
        match product.kind {
            LookupKind::Code => self.resolve_by_code(&product.value).await,
            LookupKind::Model => self.resolve_by_model(&product.value).await,
        }
    }

    async fn resolve_by_code(&mut self, code: &str) -> Resolution {
        let channels = self.health.available_channels();
        if channels.is_empty() {
            tracing::warn!("all search channels are blocked");
            return Resolution::AllChannelsBlocked;
        }

        let query = format!("{code} site:{SITE_HOST}");
        for channel in channels {
            tracing::info!(channel = channel.name(), code, "trying search channel");
            let failures = self.health.failures(channel);
            self.pacer
                .wait(Some(channel.name()), failures, false, false)
                .await;

            let results = match self
                .search
                .search(channel, &query, Config::SEARCH_RESULT_LIMIT)
                .await
            {
                Ok(results) => results,
                Err(SearchError::RateLimited(status)) => {
                    tracing::warn!(channel = channel.name(), status, "rate limit hit");
                    self.health.record_failure(channel);
                    self.consecutive_failures += 1;
                    continue;
                }
                Err(e) => {
                    // Timeouts and transport failures carry no channel
                    // penalty; the lookup still settles as not found.
                    tracing::warn!(channel = channel.name(), error = %e, "search failed without result");
                    self.consecutive_failures = 0;
                    return Resolution::NotFound;
                }
            };

            let candidates = filter_candidates(&results);
            if candidates.is_empty() {
                tracing::info!(code, "no product URLs in search results");
                self.consecutive_failures = 0;
                return Resolution::NotFound;
            }

            tracing::info!(code, count = candidates.len(), "checking candidate URLs");
            for candidate in candidates {
                if self.visited.has_visited(&candidate) {
                    tracing::info!(url = %candidate, "skipping already visited URL");
                    continue;
                }
                // Marked before the check so a dead or erroring candidate is
                // never probed again by a later pass.
                self.visited.mark_visited(&candidate);
                if self.fetcher.exists(&candidate).await {
                    self.health.record_success(channel);
                    self.consecutive_failures = 0;
                    tracing::info!(url = %candidate, channel = channel.name(), "resolved product URL");
                    return Resolution::Resolved(candidate);
                }
                tracing::info!(url = %candidate, "candidate gone, trying next");
            }

            // A conclusive-but-empty answer from one channel settles the
            // identifier; rotation is for rate-limit recovery only.
            tracing::info!(code, "all candidates dead or already visited");
            self.consecutive_failures = 0;
            return Resolution::NotFound;
        }

        // Every channel in this pass hit a rate limit.
        Resolution::AllChannelsBlocked
    }

    async fn resolve_by_model(&mut self, model: &str) -> Resolution {
        self.pacer.wait(Some("argos"), 0, false, true).await;

        let encoded = utf8_percent_encode(model, SEGMENT_ENCODE).to_string();
        let search_url = format!("{SITE_BASE}/search/{encoded}");
        if self.visited.has_visited(&search_url) {
            tracing::info!(url = %search_url, "skipping already visited search URL");
            self.consecutive_failures = 0;
            return Resolution::NotFound;
        }
        self.visited.mark_visited(&search_url);

        let response = match self.fetcher.fetch(&search_url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %search_url, error = %e, "direct search failed");
                self.consecutive_failures = 0;
                return Resolution::NotFound;
            }
        };

        // A redirect straight onto a product page needs no body parse.
        if is_valid_product_url(&response.final_url) {
            tracing::info!(url = %response.final_url, "direct redirect to product page");
            self.consecutive_failures = 0;
            return Resolution::Resolved(response.final_url);
        }

        let mut candidates: Vec<String> = Vec::new();
        for href in extract_product_anchors(&response.body) {
            let absolute = if href.starts_with("http") {
                href
            } else {
                format!("{SITE_BASE}{href}")
            };
            if is_valid_product_url(&absolute)
                && !self.visited.has_visited(&absolute)
                && !candidates.contains(&absolute)
            {
                candidates.push(absolute);
            }
        }

        // Some searches land on a listing URL that embeds the product path in
        // a clickSR redirect parameter; recover it.
        if candidates.is_empty() && response.final_url.contains("clickSR=") {
            if let Some(found) = PRODUCT_PATH.find(&response.final_url) {
                let url = format!("{SITE_BASE}{}", found.as_str());
                if !self.visited.has_visited(&url) {
                    candidates.push(url);
                }
            }
        }

        self.consecutive_failures = 0;
        match candidates.into_iter().next() {
            Some(url) => {
                tracing::info!(url = %url, model, "found product via direct search");
                Resolution::Resolved(url)
            }
            None => {
                tracing::info!(model, "no product links in direct search results");
                Resolution::NotFound
            }
        }
    }
}

/// Anchor hrefs on a search-results page that point at a product path.
fn extract_product_anchors(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("Invalid CSS selector");
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| PRODUCT_PATH.is_match(href))
        .map(str::to_string)
        .collect()
}
