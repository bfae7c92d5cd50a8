//! Feed retrieval: where a feed lives, and fetching it into events.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info};
use url::Url;

use crate::error::{CalWatchError, CalWatchResult};
use crate::event::Event;
use crate::ics::FeedParser;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Where a feed is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedLocation {
    /// An http(s) URL. `webcal://` URLs are stored rewritten to `https://`.
    Remote(Url),
    Local(PathBuf),
}

impl FeedLocation {
    /// Parse a feed location from a URL or a filesystem path (`~` is expanded).
    pub fn parse(raw: &str) -> CalWatchResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CalWatchError::ConfigValidation(
                "feed location is empty".into(),
            ));
        }

        let Ok(url) = Url::parse(raw) else {
            return Ok(FeedLocation::Local(local_path(raw)));
        };

        match url.scheme() {
            "http" | "https" => Ok(FeedLocation::Remote(url)),
            "webcal" | "webcals" => {
                // `Url::set_scheme` refuses to turn a non-special scheme into https.
                let rest = &raw[url.scheme().len()..];
                Url::parse(&format!("https{}", rest))
                    .map(FeedLocation::Remote)
                    .map_err(|e| CalWatchError::ConfigValidation(format!("invalid feed URL '{}': {}", raw, e)))
            }
            "file" => url
                .to_file_path()
                .map(FeedLocation::Local)
                .map_err(|_| CalWatchError::ConfigValidation(format!("invalid file URL '{}'", raw))),
            // Single letters are Windows drive prefixes, not schemes.
            scheme if scheme.len() == 1 => Ok(FeedLocation::Local(local_path(raw))),
            scheme => Err(CalWatchError::ConfigValidation(format!(
                "unsupported feed scheme '{}' in '{}'",
                scheme, raw
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, FeedLocation::Remote(_))
    }
}

fn local_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

impl fmt::Display for FeedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedLocation::Remote(url) => write!(f, "{}", url),
            FeedLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A named feed. The name becomes the `source` of every event read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub location: FeedLocation,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, location: &str) -> CalWatchResult<Self> {
        Ok(FeedSource {
            name: name.into(),
            location: FeedLocation::parse(location)?,
        })
    }
}

struct CachedFeed {
    fetched_at: Instant,
    events: Vec<Event>,
}

/// Fetches and parses feeds, caching results for a short time.
pub struct FeedFetcher {
    client: reqwest::Client,
    parser: FeedParser,
    cache_ttl: Duration,
    cache: Mutex<HashMap<(String, FeedLocation), CachedFeed>>,
}

impl FeedFetcher {
    /// A zero `cache_ttl` disables caching.
    pub fn new(parser: FeedParser, timeout: Duration, cache_ttl: Duration) -> CalWatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("calwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalWatchError::Config(format!("Could not create HTTP client: {}", e)))?;

        Ok(FeedFetcher {
            client,
            parser,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch one location by URL or path.
    ///
    /// A location that cannot be interpreted is reported as a fetch failure.
    pub async fn fetch_url(&self, location: &str, source_name: &str) -> CalWatchResult<Vec<Event>> {
        let source = FeedSource::new(source_name, location)
            .map_err(|e| CalWatchError::fetch(source_name, location, e))?;
        self.fetch(&source).await
    }

    /// Fetch and parse one feed.
    ///
    /// Transport problems (timeout, DNS, non-2xx status, unreadable file) are
    /// `CalWatchError::Fetch`; an unreadable document is `CalWatchError::Parse`.
    pub async fn fetch(&self, source: &FeedSource) -> CalWatchResult<Vec<Event>> {
        if let Some(events) = self.cached(source) {
            debug!(source = %source.name, count = events.len(), "Using cached feed");
            return Ok(events);
        }

        let raw = self.fetch_raw(source).await?;
        let events = self.parser.parse(&raw, &source.name)?;
        info!(source = %source.name, location = %source.location, count = events.len(), "Fetched feed");

        self.store(source, &events);
        Ok(events)
    }

    /// Fetch every source concurrently. Results come back in input order.
    pub async fn fetch_all(&self, sources: &[FeedSource]) -> Vec<CalWatchResult<Vec<Event>>> {
        join_all(sources.iter().map(|source| self.fetch(source))).await
    }

    /// Drop every cached feed.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    async fn fetch_raw(&self, source: &FeedSource) -> CalWatchResult<String> {
        let fail = |reason: String| {
            CalWatchError::fetch(&source.name, &source.location.to_string(), reason)
        };

        match &source.location {
            FeedLocation::Remote(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| fail(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| fail(e.to_string()))?;
                response.text().await.map_err(|e| fail(e.to_string()))
            }
            FeedLocation::Local(path) => tokio::fs::read_to_string(path).await.map_err(|e| fail(e.to_string())),
        }
    }

    fn cached(&self, source: &FeedSource) -> Option<Vec<Event>> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&(source.name.clone(), source.location.clone()))
            .filter(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.events.clone())
    }

    fn store(&self, source: &FeedSource, events: &[Event]) {
        if self.cache_ttl.is_zero() {
            return;
        }
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(
            (source.name.clone(), source.location.clone()),
            CachedFeed {
                fetched_at: Instant::now(),
                events: events.to_vec(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//calwatch//test//EN\r\n\
BEGIN:VEVENT\r\n\
UID:standup@example.com\r\n\
DTSTART:20240315T090000Z\r\n\
DTEND:20240315T091500Z\r\n\
SUMMARY:Standup\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:offsite@example.com\r\n\
DTSTART;VALUE=DATE:20240320\r\n\
SUMMARY:Offsite\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn fetcher(cache_ttl: Duration) -> FeedFetcher {
        FeedFetcher::new(FeedParser::new(), Duration::from_secs(2), cache_ttl)
            .expect("Should build fetcher")
    }

    async fn serve(body: &str, status: u16, expected_hits: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/work.ics"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(expected_hits)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_parse_location_kinds() {
        assert_eq!(
            FeedLocation::parse("webcal://example.com/cal.ics").unwrap(),
            FeedLocation::Remote(Url::parse("https://example.com/cal.ics").unwrap())
        );
        assert!(FeedLocation::parse("https://example.com/cal.ics").unwrap().is_remote());
        assert_eq!(
            FeedLocation::parse("/tmp/cal.ics").unwrap(),
            FeedLocation::Local(PathBuf::from("/tmp/cal.ics"))
        );
        assert!(!FeedLocation::parse("~/cal.ics").unwrap().to_string().starts_with('~'));
    }

    #[test]
    fn test_parse_location_rejects_unusable_input() {
        assert!(matches!(
            FeedLocation::parse("  "),
            Err(CalWatchError::ConfigValidation(_))
        ));
        assert!(matches!(
            FeedLocation::parse("ftp://example.com/cal.ics"),
            Err(CalWatchError::ConfigValidation(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_parses_remote_feed() {
        let server = serve(FEED, 200, 1).await;
        let events = fetcher(Duration::ZERO)
            .fetch_url(&format!("{}/work.ics", server.uri()), "work")
            .await
            .expect("Should fetch");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Standup");
        assert!(events[1].is_all_day);
        assert!(events.iter().all(|e| e.source == "work"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_fetch_failure() {
        let server = serve("gone", 404, 1).await;
        let err = fetcher(Duration::ZERO)
            .fetch_url(&format!("{}/work.ics", server.uri()), "work")
            .await
            .unwrap_err();

        assert!(matches!(err, CalWatchError::Fetch { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_html_body_is_parse_failure() {
        let server = serve("<html><body>Sign in</body></html>", 200, 1).await;
        let err = fetcher(Duration::ZERO)
            .fetch_url(&format!("{}/work.ics", server.uri()), "work")
            .await
            .unwrap_err();

        assert!(matches!(err, CalWatchError::Parse { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/work.ics"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FEED)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(FeedParser::new(), Duration::from_millis(200), Duration::ZERO)
            .expect("Should build fetcher");
        let err = fetcher
            .fetch_url(&format!("{}/work.ics", server.uri()), "work")
            .await
            .unwrap_err();

        assert!(matches!(err, CalWatchError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_fetches_until_invalidated() {
        let server = serve(FEED, 200, 2).await;
        let fetcher = fetcher(Duration::from_secs(60));
        let source = FeedSource::new("work", &format!("{}/work.ics", server.uri())).unwrap();

        let first = fetcher.fetch(&source).await.expect("Should fetch");
        let second = fetcher.fetch(&source).await.expect("Should hit cache");
        assert_eq!(first, second);

        fetcher.invalidate();
        fetcher.fetch(&source).await.expect("Should refetch");
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_source_order() {
        let server = serve(FEED, 200, 1).await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("home.ics");
        std::fs::write(&file, FEED).unwrap();

        let sources = vec![
            FeedSource::new("home", file.to_str().unwrap()).unwrap(),
            FeedSource::new("work", &format!("{}/work.ics", server.uri())).unwrap(),
            FeedSource::new("missing", dir.path().join("nope.ics").to_str().unwrap()).unwrap(),
        ];

        let results = fetcher(Duration::ZERO).fetch_all(&sources).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()[0].source, "home");
        assert_eq!(results[1].as_ref().unwrap()[0].source, "work");
        assert!(matches!(results[2], Err(CalWatchError::Fetch { .. })));
    }
}
