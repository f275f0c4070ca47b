//! Batch driver: walks the identifier list, settles each one through the
//! resolver, hands successes to the extractor, and keeps the persisted state
//! current throughout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::channels::{ChannelHealth, SearchChannel};
use crate::config::Config;
use crate::extract::Extractor;
use crate::input::{self, InputError};
use crate::network::HttpClient;
use crate::resolver::{Resolution, Resolver};
use crate::search::WebSearch;
use crate::store::StateStore;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("state directory error: {0}")]
    Store(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input_csv: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Operator override: re-resolve identifiers already in the resolved set.
    pub rescrape: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub not_found: usize,
    pub skipped_resolved: usize,
    pub skipped_not_found: usize,
    pub stopped_early: bool,
}

/// Run the whole batch. `shutdown` is polled between identifiers - that is
/// the unit of interruptibility; the current lookup always completes.
pub async fn run_batch(
    options: &BatchOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<BatchSummary, DriverError> {
    let store = StateStore::new(&options.data_dir)?;
    let state = store.load();
    let mut resolved = state.resolved;
    let mut not_found = state.not_found;

    let fetcher = Arc::new(HttpClient::new(Config::REQUEST_TIMEOUT_SECS));
    let search = Arc::new(WebSearch::new(Config::SEARCH_TIMEOUT_SECS));
    let mut resolver = Resolver::new(fetcher.clone(), search, state.channels, state.visited);
    let extractor = Extractor::new(fetcher, &options.output_dir);

    let products = input::load_products(&options.input_csv)?;

    let mut summary = BatchSummary::default();
    let mut queue = Vec::new();
    for product in products {
        if resolved.contains(&product.value) && !options.rescrape {
            summary.skipped_resolved += 1;
            continue;
        }
        if not_found.contains(&product.value) {
            summary.skipped_not_found += 1;
            continue;
        }
        queue.push(product);
    }

    tracing::info!(
        to_process = queue.len(),
        skipped_resolved = summary.skipped_resolved,
        skipped_not_found = summary.skipped_not_found,
        "batch starting"
    );
    if queue.is_empty() {
        tracing::info!("no new products to process");
        return Ok(summary);
    }

    let total = queue.len();
    for (index, product) in queue.into_iter().enumerate() {
        if shutdown.load(Ordering::SeqCst) {
            tracing::warn!("interrupt received, stopping before next identifier");
            summary.stopped_early = true;
            break;
        }

        tracing::info!(
            n = index + 1,
            total,
            id = %product.value,
            kind = product.kind.label(),
            "processing product"
        );

        // Circuit breaker: sustained blocking across channels that per-channel
        // backoff has not resolved earns one long pause.
        if resolver.consecutive_failures() >= Config::MAX_CONSECUTIVE_FAILURES {
            tracing::warn!("too many consecutive failures, taking a long cooldown");
            resolver.forced_cooldown().await;
        }

        match resolver.resolve(&product).await {
            Resolution::AllChannelsBlocked => {
                tracing::error!("all search channels blocked, saving state");
                store.save(&resolved, &not_found, resolver.health(), resolver.visited());

                if let Some(remaining) = resolver.health().min_remaining_cooldown() {
                    let minutes = remaining.as_secs_f64() / 60.0;
                    tracing::info!(minutes, "minimum cooldown remaining");
                    if remaining.as_secs() > Config::RESUME_LATER_THRESHOLD_SECS {
                        tracing::info!("cooldown too long to wait out, resume the batch later");
                        summary.stopped_early = true;
                        break;
                    }
                }
                // Identifier left unsettled for a later run.
                continue;
            }
            Resolution::NotFound => {
                not_found.insert(product.value.clone());
                summary.not_found += 1;
            }
            Resolution::Resolved(url) => {
                if index > 0 {
                    resolver.pace_before_scrape().await;
                }
                if extractor
                    .scrape(resolver.visited_mut(), &product, &url)
                    .await
                {
                    resolved.insert(product.value.clone());
                    summary.successful += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
        summary.processed += 1;

        if (index + 1) % Config::SAVE_EVERY == 0 {
            store.save(&resolved, &not_found, resolver.health(), resolver.visited());
        }
    }

    store.save(&resolved, &not_found, resolver.health(), resolver.visited());

    tracing::info!(
        processed = summary.processed,
        successful = summary.successful,
        failed = summary.failed,
        not_found = summary.not_found,
        total_resolved = resolved.len(),
        total_not_found = not_found.len(),
        urls_visited = resolver.visited().len(),
        "batch complete"
    );
    log_channel_report(resolver.health());

    Ok(summary)
}

/// Per-channel status block, also used by the `status` subcommand.
pub fn log_channel_report(health: &ChannelHealth) {
    for channel in SearchChannel::ALL {
        let state = health.state(channel);
        if state.blocked {
            let remaining_min = health
                .remaining_cooldown(channel)
                .map(|d| d.as_secs_f64() / 60.0)
                .unwrap_or(0.0);
            tracing::info!(
                channel = channel.name(),
                status = "BLOCKED",
                failures = state.consecutive_failures,
                cooldown_min = remaining_min,
                "channel status"
            );
        } else {
            tracing::info!(
                channel = channel.name(),
                status = "AVAILABLE",
                failures = state.consecutive_failures,
                "channel status"
            );
        }
    }
}
