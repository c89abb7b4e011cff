//! Backend seam for the extraction strategies.
//!
//! The orchestrator never talks to reqwest or a browser directly; it
//! drives a [`ScrapeBackend`], and every backend returns the same
//! intermediate [`RawPage`] record. This trait is also the test seam:
//! the retry, caching and post-processing logic is exercised against
//! scripted mock backends instead of live pages.

use async_trait::async_trait;

use super::ScrapeError;
use crate::model::ScrapingOptions;

/// One extracted tracklist row, before model validation.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub title: String,
    pub artist: Option<String>,
    pub remix: Option<String>,
    pub time: Option<String>,
    pub label: Option<String>,
    /// Outbound anchor hrefs found inside the row.
    pub links: Vec<String>,
}

/// Uniform intermediate record produced by every backend.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub venue: Option<String>,
    pub date: Option<String>,
    pub image: Option<String>,
    pub rows: Vec<RawRow>,
}

/// An interchangeable extraction strategy.
#[async_trait]
pub trait ScrapeBackend: Send + Sync {
    /// Stable backend name, recorded in `ScrapeStats::method`.
    fn name(&self) -> &'static str;

    /// Fetch and extract one page.
    ///
    /// Implementations must honor `options.timeout_ms` per attempt and
    /// release any OS resources (sockets, browser processes) before
    /// returning or when the future is dropped.
    async fn fetch(&self, url: &str, options: &ScrapingOptions) -> Result<RawPage, ScrapeError>;

    /// Fetch a page's rendered HTML without tracklist interpretation.
    ///
    /// Metadata providers run their own extraction over this; the same
    /// timeout and resource rules as [`ScrapeBackend::fetch`] apply.
    async fn fetch_html(&self, url: &str, options: &ScrapingOptions)
        -> Result<String, ScrapeError>;
}

/// Scriptable backend for tests: pops one canned outcome per call.
#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub struct MockBackend {
        outcomes: Mutex<Vec<Result<RawPage, ScrapeError>>>,
        html_outcomes: Mutex<Vec<Result<String, ScrapeError>>>,
        delay: Option<std::time::Duration>,
        pub calls: AtomicUsize,
        /// Observable "open session" count, for cleanup assertions.
        pub open_sessions: Arc<AtomicUsize>,
    }

    /// Decrements the session counter on drop, so cancelled fetches
    /// still "close" their session — mirroring the browser guard.
    struct OpenSession(Arc<AtomicUsize>);

    impl Drop for OpenSession {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockBackend {
        /// Outcomes are consumed front to back, one per `fetch` call.
        pub fn with_outcomes(outcomes: Vec<Result<RawPage, ScrapeError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                html_outcomes: Mutex::new(Vec::new()),
                delay: None,
                calls: AtomicUsize::new(0),
                open_sessions: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Scripted raw-HTML responses for `fetch_html` callers.
        pub fn with_html_outcomes(outcomes: Vec<Result<String, ScrapeError>>) -> Self {
            Self {
                outcomes: Mutex::new(Vec::new()),
                html_outcomes: Mutex::new(outcomes),
                delay: None,
                calls: AtomicUsize::new(0),
                open_sessions: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Make every fetch stall, for cancellation tests.
        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn page(rows: Vec<RawRow>) -> RawPage {
            RawPage {
                title: Some("Test Set".to_string()),
                artist: Some("Test Artist".to_string()),
                rows,
                ..Default::default()
            }
        }

        pub fn row(title: &str, artist: &str) -> RawRow {
            RawRow {
                title: title.to_string(),
                artist: Some(artist.to_string()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ScrapeBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn fetch(
            &self,
            _url: &str,
            _options: &ScrapingOptions,
        ) -> Result<RawPage, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Simulate an open session that is torn down even when the
            // future is dropped mid-flight.
            self.open_sessions.fetch_add(1, Ordering::SeqCst);
            let _session = OpenSession(self.open_sessions.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                return Err(ScrapeError::ExtractionEmpty);
            }
            outcomes.remove(0)
        }

        async fn fetch_html(
            &self,
            _url: &str,
            _options: &ScrapingOptions,
        ) -> Result<String, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut outcomes = self.html_outcomes.lock();
            if outcomes.is_empty() {
                return Err(ScrapeError::ExtractionEmpty);
            }
            outcomes.remove(0)
        }
    }
}
