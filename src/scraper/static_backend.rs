//! Static HTTP extraction backend.
//!
//! The cheap path: one GET through the shared request limiter, with
//! rotated realistic headers, parsed by the selector chains. Works for
//! pages that render server-side; JS-rendered pages come back without
//! rows and are escalated to a headless strategy by the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::backend::{RawPage, ScrapeBackend};
use super::{selectors, ScrapeError};
use crate::model::ScrapingOptions;
use crate::ratelimit::RequestLimiter;

/// Rotated user-agent pool. Real, current desktop browser strings —
/// obviously synthetic UAs are an instant block on the sites we target.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

/// Pick a user agent: explicit override first, otherwise rotate.
pub fn pick_user_agent(override_ua: Option<&str>) -> String {
    match override_ua {
        Some(ua) => ua.to_string(),
        None => {
            let idx = rand::rng().random_range(0..USER_AGENTS.len());
            USER_AGENTS[idx].to_string()
        }
    }
}

/// Plain-HTTP extraction strategy.
pub struct StaticBackend {
    http_client: reqwest::Client,
    limiter: Arc<RequestLimiter>,
}

impl StaticBackend {
    pub fn new(limiter: Arc<RequestLimiter>) -> Self {
        // UA is set per-request (rotation), so the builder only carries
        // transport concerns.
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            limiter,
        }
    }

    async fn get_html(&self, url: &str, options: &ScrapingOptions) -> Result<String, ScrapeError> {
        let _permit = self.limiter.acquire().await;

        let referer = origin_of(url);
        let request = self
            .http_client
            .get(url)
            .timeout(Duration::from_millis(options.timeout_ms))
            .header(
                reqwest::header::USER_AGENT,
                pick_user_agent(options.user_agent.as_deref()),
            )
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        let request = match referer {
            Some(ref origin) => request.header(reqwest::header::REFERER, origin.as_str()),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout {
                    ms: options.timeout_ms,
                }
            } else {
                ScrapeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Bot mitigation answering instead of the page.
            return Err(ScrapeError::NavigationBlocked);
        }
        if !status.is_success() {
            return Err(ScrapeError::Http(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ScrapeError::Network(e.to_string()))
    }
}

#[async_trait]
impl ScrapeBackend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, url: &str, options: &ScrapingOptions) -> Result<RawPage, ScrapeError> {
        let html = self.get_html(url, options).await?;
        let page = selectors::parse_tracklist_page(&html);

        if page.rows.is_empty() {
            // Page loaded but had no recognizable structure — most
            // likely client-side rendered. Let the orchestrator
            // escalate to a headless strategy.
            return Err(ScrapeError::ExtractionEmpty);
        }

        Ok(page)
    }

    async fn fetch_html(
        &self,
        url: &str,
        options: &ScrapingOptions,
    ) -> Result<String, ScrapeError> {
        self.get_html(url, options).await
    }
}

/// Scheme+host origin of a URL, used as a plausible referer.
fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}/", parsed.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_user_agent_respects_override() {
        let ua = pick_user_agent(Some("custom-agent/1.0"));
        assert_eq!(ua, "custom-agent/1.0");
    }

    #[test]
    fn test_pick_user_agent_rotates_from_pool() {
        let ua = pick_user_agent(None);
        assert!(USER_AGENTS.contains(&ua.as_str()));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://www.1001tracklists.com/tracklist/abc.html").as_deref(),
            Some("https://www.1001tracklists.com/")
        );
        assert!(origin_of("not a url").is_none());
    }
}
