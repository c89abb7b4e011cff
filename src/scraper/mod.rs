//! Scraping engine - extracts structured tracklists from catalog pages.
//!
//! # Architecture
//!
//! This module follows a strict separation between:
//! - **Backends** (`static_backend.rs`, `headless.rs`) - interchangeable
//!   extraction strategies behind one trait
//! - **Selectors** (`selectors.rs`) - ordered fallback chains shared by
//!   every backend
//! - **Post-processing** (`postprocess.rs`) - dedupe, duration
//!   normalization, link probing
//! - **Orchestrator** (this file) - cache lookup, strategy selection,
//!   retry with backoff, result assembly
//!
//! The orchestrator's contract: the only error a caller ever sees is
//! [`ScrapeError::InvalidInput`]. Everything else — timeouts, blocks,
//! empty pages, exhausted retries — is folded into a returned
//! [`ScrapingResult`] with `success: false` and diagnostics in
//! `errors`, because the download pipeline and UI want a value to
//! render, not an exception to unwind.

pub mod backend;
pub mod headless;
pub mod platform;
pub mod postprocess;
pub mod selectors;
pub mod static_backend;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStats, CacheStore};
use crate::config::Config;
use crate::model::{
    PlaylistMetadata, ScrapeMethod, ScrapeStats, ScrapingOptions, ScrapingResult, Track, TrackLink,
};
use crate::ratelimit::RequestLimiter;
use backend::{RawPage, RawRow, ScrapeBackend};

/// Errors that can occur during scraping.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Navigation blocked by anti-bot protection")]
    NavigationBlocked,

    #[error("Page loaded but no recognizable structure found")]
    ExtractionEmpty,

    #[error("Timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("HTTP error: status {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// Ceiling for one backoff pause, jitter included.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

static REMIX_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(([^)]*\b(?:remix|edit|bootleg|rework|dub|vip|mix)\b[^)]*)\)")
        .expect("static regex")
});

/// Top-level scraping service.
///
/// Owns the shared request limiter and cache and passes them to its
/// backends, so one `Scraper` instance means one request budget no
/// matter how many strategies run.
pub struct Scraper {
    backends: Vec<Arc<dyn ScrapeBackend>>,
    headless_enabled: bool,
    limiter: Arc<RequestLimiter>,
    cache: Arc<CacheStore>,
    http_client: reqwest::Client,
}

impl Scraper {
    /// Create a scraper with real backends.
    pub fn new(config: &Config) -> Self {
        let limiter = Arc::new(RequestLimiter::new(
            config.scraper.max_concurrent_requests,
            Duration::from_millis(config.scraper.min_request_interval_ms),
        ));
        let cache = Arc::new(CacheStore::new(
            config.cache.memory_capacity,
            crate::cache::default_dir(),
        ));
        Self::assemble(config.scraper.headless_enabled, limiter, cache)
    }

    /// The shared request limiter, for wiring providers to the same
    /// request budget.
    pub fn limiter(&self) -> Arc<RequestLimiter> {
        self.limiter.clone()
    }

    fn assemble(
        headless_enabled: bool,
        limiter: Arc<RequestLimiter>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let backends: Vec<Arc<dyn ScrapeBackend>> = vec![
            Arc::new(static_backend::StaticBackend::new(limiter.clone())),
            Arc::new(headless::HeadlessBackend::new(
                headless::HeadlessMode::Robust,
                limiter.clone(),
            )),
            Arc::new(headless::HeadlessBackend::new(
                headless::HeadlessMode::Advanced,
                limiter.clone(),
            )),
        ];
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            backends,
            headless_enabled,
            limiter,
            cache,
            http_client,
        }
    }

    /// Test constructor: scripted backends, injected services.
    #[cfg(test)]
    pub fn with_backends(
        backends: Vec<Arc<dyn ScrapeBackend>>,
        cache: Arc<CacheStore>,
        limiter: Arc<RequestLimiter>,
    ) -> Self {
        Self {
            backends,
            headless_enabled: true,
            limiter,
            cache,
            http_client: reqwest::Client::new(),
        }
    }

    /// Scrape one tracklist page.
    ///
    /// Fails fast with [`ScrapeError::InvalidInput`] on a malformed
    /// URL; every other failure mode produces a degraded
    /// [`ScrapingResult`].
    pub async fn scrape(
        &self,
        url: &str,
        options: &ScrapingOptions,
    ) -> Result<ScrapingResult, ScrapeError> {
        let start = Instant::now();
        validate_url(url)?;

        let key = fingerprint(url, options);
        if options.use_cache {
            if let Some(mut cached) = self.cache.get::<ScrapingResult>(&key) {
                tracing::info!("Cache hit for {}", url);
                cached.stats.scraping_time_ms = start.elapsed().as_millis() as u64;
                return Ok(cached);
            }
        }

        let chain = self.strategy_chain(options.method);
        let attempts = options.retries.max(1);
        let mut errors: Vec<String> = Vec::new();
        let mut outcome: Option<(RawPage, &'static str)> = None;
        let mut last_method = "none";

        'strategies: for backend in &chain {
            last_method = backend.name();
            for attempt in 1..=attempts {
                match backend.fetch(url, options).await {
                    Ok(page) => {
                        outcome = Some((page, backend.name()));
                        break 'strategies;
                    }
                    Err(e) => {
                        errors.push(format!("{}: attempt {}: {}", backend.name(), attempt, e));
                        let blocked = matches!(e, ScrapeError::NavigationBlocked);
                        if blocked {
                            // Retrying a blocked strategy re-trips the
                            // same defense; move on to the next one.
                            tracing::warn!("{} blocked, trying next strategy", backend.name());
                            continue 'strategies;
                        }
                        if attempt < attempts {
                            tracing::warn!(
                                "{} attempt {}/{} failed: {}; retrying",
                                backend.name(),
                                attempt,
                                attempts,
                                e
                            );
                            backoff_pause(options.delay_ms, attempt).await;
                        } else {
                            tracing::warn!(
                                "{} exhausted {} attempts: {}",
                                backend.name(),
                                attempts,
                                e
                            );
                        }
                    }
                }
            }
        }

        let Some((page, method)) = outcome else {
            let mut result = ScrapingResult::failure(url, last_method, errors);
            result.stats.scraping_time_ms = start.elapsed().as_millis() as u64;
            return Ok(result);
        };

        let result = self
            .assemble_result(url, page, method, errors, start, options)
            .await;

        self.cache.set(&key, &result, options.cache_ttl_secs);
        Ok(result)
    }

    /// Build the final result from a backend's raw page.
    async fn assemble_result(
        &self,
        url: &str,
        page: RawPage,
        method: &str,
        errors: Vec<String>,
        start: Instant,
        options: &ScrapingOptions,
    ) -> ScrapingResult {
        let mut tracks: Vec<Track> = page
            .rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| build_track(i as u32 + 1, row))
            .collect();

        if options.include_metadata {
            postprocess::normalize_durations(&mut tracks);
        }
        let mut tracks = postprocess::dedupe_tracks(tracks);
        if options.validate_links {
            postprocess::verify_links(&mut tracks, &self.http_client, &self.limiter).await;
        }

        let mut stats = ScrapeStats {
            method: method.to_string(),
            scraping_time_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };
        stats.recompute(&tracks);

        let metadata = PlaylistMetadata {
            title: page.title.unwrap_or_else(|| "Untitled Set".to_string()),
            artist: page.artist.unwrap_or_default(),
            venue: page.venue,
            date: page.date,
            url: url.to_string(),
            total_tracks: tracks.len(),
            scraped_at: Utc::now(),
        };

        ScrapingResult {
            success: true,
            metadata: Some(metadata),
            tracks,
            stats,
            errors,
        }
    }

    /// Ordered backends for the requested method.
    fn strategy_chain(&self, method: ScrapeMethod) -> Vec<Arc<dyn ScrapeBackend>> {
        match method {
            ScrapeMethod::Static => self.pick(&["static"]),
            ScrapeMethod::HeadlessRobust => self.pick(&["headless-robust"]),
            ScrapeMethod::HeadlessAdvanced => self.pick(&["headless-advanced"]),
            ScrapeMethod::Auto => {
                if self.headless_enabled {
                    self.backends.clone()
                } else {
                    // Headless disabled: static fetch is all we may use.
                    self.pick(&["static"])
                }
            }
        }
    }

    fn pick(&self, names: &[&str]) -> Vec<Arc<dyn ScrapeBackend>> {
        let picked: Vec<_> = self
            .backends
            .iter()
            .filter(|b| names.contains(&b.name()))
            .cloned()
            .collect();
        if picked.is_empty() {
            // Unknown name (only reachable with injected backends):
            // fall back to the full chain rather than doing nothing.
            self.backends.clone()
        } else {
            picked
        }
    }

    /// Cache counters, for the CLI and diagnostics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop the cached entry for one URL/options pair.
    pub fn invalidate(&self, url: &str, options: &ScrapingOptions) {
        self.cache.invalidate(&fingerprint(url, options));
    }

    /// Wipe the whole cache.
    pub fn clear_cache(&self) -> Result<(), crate::cache::CacheError> {
        self.cache.clear()
    }
}

/// Validate the URL shape before any network traffic.
fn validate_url(url: &str) -> Result<(), ScrapeError> {
    let parsed =
        url::Url::parse(url).map_err(|e| ScrapeError::InvalidInput(format!("{url}: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ScrapeError::InvalidInput(format!(
            "unsupported scheme {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, |h| h.is_empty()) {
        return Err(ScrapeError::InvalidInput("missing host".to_string()));
    }
    Ok(())
}

/// Stable cache key: Sha256 over the URL and the options that affect
/// the payload.
fn fingerprint(url: &str, options: &ScrapingOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(options.fingerprint_component().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Exponential backoff with jitter: delay * 2^(attempt-1) plus up to
/// half a delay of noise, capped.
async fn backoff_pause(base_delay_ms: u64, attempt: u32) {
    let exp = base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
    let jitter = rand::rng().random_range(0..=base_delay_ms / 2 + 1);
    let pause = Duration::from_millis(exp + jitter).min(MAX_BACKOFF);
    tokio::time::sleep(pause).await;
}

/// Convert a raw row into a model track, dropping junk rows.
fn build_track(position: u32, row: RawRow) -> Option<Track> {
    let mut track = Track::new(position, &row.title)?;
    track.artist = row.artist.map(|a| crate::model::normalize_whitespace(&a));
    track.time = row.time;
    track.label = row.label;
    track.remix = row.remix.or_else(|| {
        REMIX_ANNOTATION
            .captures(&track.title)
            .map(|c| c[1].to_string())
    });

    for href in row.links {
        let platform = platform::classify(&href);
        track.add_link(TrackLink::new(platform, href));
    }
    Some(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::mock::MockBackend;
    use std::sync::atomic::Ordering;

    fn scraper_with(backends: Vec<Arc<dyn ScrapeBackend>>) -> Scraper {
        Scraper::with_backends(
            backends,
            Arc::new(CacheStore::memory_only(32)),
            Arc::new(RequestLimiter::new(8, Duration::from_millis(1))),
        )
    }

    fn fast_options() -> ScrapingOptions {
        ScrapingOptions {
            delay_ms: 5,
            ..Default::default()
        }
    }

    const URL: &str = "https://www.1001tracklists.com/tracklist/test.html";

    #[tokio::test]
    async fn test_invalid_url_fails_fast() {
        let scraper = scraper_with(vec![Arc::new(MockBackend::with_outcomes(vec![]))]);
        let err = scraper
            .scrape("not a url", &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));

        let err = scraper
            .scrape("ftp://example.com/x", &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_successful_scrape_builds_result() {
        let page = MockBackend::page(vec![
            MockBackend::row("Strobe", "deadmau5"),
            MockBackend::row("Opus", "Eric Prydz"),
        ]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![Ok(page)]));
        let scraper = scraper_with(vec![backend]);

        let result = scraper.scrape(URL, &fast_options()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.stats.total_tracks, 2);
        assert_eq!(result.stats.method, "mock");
        let meta = result.metadata.unwrap();
        assert_eq!(meta.title, "Test Set");
        assert_eq!(meta.total_tracks, 2);
    }

    #[tokio::test]
    async fn test_retry_then_succeed_uses_third_attempt() {
        let page = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![
            Err(ScrapeError::Network("reset".to_string())),
            Err(ScrapeError::Network("reset".to_string())),
            Ok(page),
        ]));
        let scraper = scraper_with(vec![backend.clone()]);

        let result = scraper.scrape(URL, &fast_options()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        // Two failed attempts leave two diagnostic entries.
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_not_throw() {
        let backend = Arc::new(MockBackend::with_outcomes(vec![
            Err(ScrapeError::Network("down".to_string())),
            Err(ScrapeError::Network("down".to_string())),
            Err(ScrapeError::Network("down".to_string())),
        ]));
        let scraper = scraper_with(vec![backend.clone()]);

        let result = scraper.scrape(URL, &fast_options()).await.unwrap();
        assert!(!result.success);
        assert!(result.tracks.is_empty());
        assert_eq!(result.errors.len(), 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_blocked_strategy_falls_through_to_next() {
        let blocked = Arc::new(MockBackend::with_outcomes(vec![Err(
            ScrapeError::NavigationBlocked,
        )]));
        let page = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let working = Arc::new(MockBackend::with_outcomes(vec![Ok(page)]));
        let scraper = scraper_with(vec![blocked.clone(), working.clone()]);

        let result = scraper.scrape(URL, &fast_options()).await.unwrap();
        assert!(result.success);
        // Blocked backend is not retried.
        assert_eq!(blocked.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let page = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![Ok(page)]));
        let scraper = scraper_with(vec![backend.clone()]);

        let first = scraper.scrape(URL, &fast_options()).await.unwrap();
        let second = scraper.scrape(URL, &fast_options()).await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.tracks.len(), second.tracks.len());
        assert_eq!(
            first.tracks[0].title, second.tracks[0].title,
            "cached result must be identical"
        );
    }

    #[tokio::test]
    async fn test_cache_bypassed_when_disabled() {
        let page = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let page2 = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![Ok(page), Ok(page2)]));
        let scraper = scraper_with(vec![backend.clone()]);

        let options = ScrapingOptions {
            use_cache: false,
            ..fast_options()
        };
        scraper.scrape(URL, &options).await.unwrap();
        scraper.scrape(URL, &options).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_cache_entry_triggers_fresh_scrape() {
        let page = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let page2 = MockBackend::page(vec![MockBackend::row("Strobe", "deadmau5")]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![Ok(page), Ok(page2)]));
        let cache = Arc::new(CacheStore::memory_only(32));
        let scraper = Scraper::with_backends(
            vec![backend.clone()],
            cache.clone(),
            Arc::new(RequestLimiter::new(8, Duration::from_millis(1))),
        );

        let options = ScrapingOptions {
            cache_ttl_secs: 1,
            ..fast_options()
        };
        scraper.scrape(URL, &options).await.unwrap();

        // Simulate the TTL passing instead of sleeping for real.
        let key = fingerprint(URL, &options);
        cache.backdate_for_tests(&key, 2_500);

        scraper.scrape(URL, &options).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_collapse() {
        let page = MockBackend::page(vec![
            MockBackend::row("Strobe", "deadmau5"),
            MockBackend::row("strobe", "DEADMAU5"),
        ]);
        let backend = Arc::new(MockBackend::with_outcomes(vec![Ok(page)]));
        let scraper = scraper_with(vec![backend]);

        let result = scraper.scrape(URL, &fast_options()).await.unwrap();
        assert_eq!(result.tracks.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scrape_closes_sessions() {
        let backend = Arc::new(
            MockBackend::with_outcomes(vec![Err(ScrapeError::ExtractionEmpty)])
                .with_delay(Duration::from_secs(30)),
        );
        let sessions = backend.open_sessions.clone();
        let scraper = Arc::new(scraper_with(vec![backend]));

        let handle = {
            let scraper = scraper.clone();
            tokio::spawn(async move {
                let _ = scraper.scrape(URL, &fast_options()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sessions.load(Ordering::SeqCst), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(
            sessions.load(Ordering::SeqCst),
            0,
            "cancellation must tear down the open session"
        );
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let options = ScrapingOptions::default();
        assert_eq!(fingerprint(URL, &options), fingerprint(URL, &options));
        assert_ne!(
            fingerprint(URL, &options),
            fingerprint("https://other.example/x", &options)
        );
        let headless = ScrapingOptions {
            method: ScrapeMethod::HeadlessRobust,
            ..Default::default()
        };
        assert_ne!(fingerprint(URL, &options), fingerprint(URL, &headless));
    }

    #[test]
    fn test_build_track_extracts_remix_and_links() {
        let row = RawRow {
            title: "Strobe (Club Edit)".to_string(),
            artist: Some("deadmau5".to_string()),
            links: vec![
                "https://open.spotify.com/track/abc".to_string(),
                "https://unknownstore.example/track/1".to_string(),
            ],
            ..Default::default()
        };
        let track = build_track(1, row).unwrap();
        assert_eq!(track.remix.as_deref(), Some("Club Edit"));
        assert_eq!(track.links.len(), 2);
        assert_eq!(track.links[0].platform, crate::model::Platform::Spotify);
        assert_eq!(track.links[1].platform, crate::model::Platform::Other);
        assert!(!track.links[0].verified);
    }
}
