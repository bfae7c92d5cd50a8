pub mod events;
pub mod init;
pub mod next;
pub mod sources;
pub mod watch;

use anyhow::Result;
use calwatch_core::config::AppConfig;
use calwatch_core::{Event, FeedFetcher, aggregate};
use owo_colors::OwoColorize;
use tracing::warn;

/// Fetch every enabled feed and merge the results.
///
/// A feed that fails is reported and left out. Fails only when every feed failed.
pub async fn fetch_events(config: &AppConfig, fetcher: &FeedFetcher) -> Result<Vec<Event>> {
    let sources = config.feed_sources()?;
    let results = fetcher.fetch_all(&sources).await;

    let mut feeds = Vec::with_capacity(results.len());
    let mut failures = 0;
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(events) => feeds.push(events),
            Err(e) => {
                failures += 1;
                warn!(source = %source.name, retryable = e.is_retryable(), error = %e, "Feed unavailable");
                eprintln!("{} {}", "warning:".yellow().bold(), e);
            }
        }
    }

    if failures > 0 && feeds.is_empty() {
        anyhow::bail!("None of the {} configured feeds could be loaded", sources.len());
    }

    Ok(aggregate(feeds))
}
