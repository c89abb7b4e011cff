//! Headless-browser extraction backends.
//!
//! Some tracklist hosts render rows client-side and sit behind bot
//! mitigation, so the static backend gets either an empty shell or an
//! interstitial. The headless backends drive a real Chromium through
//! chromiumoxide with automation markers masked, pace interactions like
//! a person, and walk an explicit recovery state machine when an
//! interstitial appears:
//!
//! ```text
//! Loading -> Interstitial -> (wait | click continue | re-navigate)
//!         -> Ready | Blocked
//! ```
//!
//! `Blocked` is terminal for the attempt; the backend then falls
//! through its navigation strategies (direct, pre-visit-then-navigate,
//! mobile-variant URL) in fixed order before giving up with
//! [`ScrapeError::NavigationBlocked`].
//!
//! Browser processes are OS resources: every session is wrapped in a
//! guard whose `Drop` tears the process down even when the scrape
//! future is cancelled mid-flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::Rng;

use super::backend::{RawPage, ScrapeBackend};
use super::{selectors, static_backend, ScrapeError};
use crate::model::ScrapingOptions;
use crate::ratelimit::RequestLimiter;

/// Masks the automation markers bot-detection scripts probe first.
/// Injected before any site script runs.
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', {
    get: () => [{ name: 'Chrome PDF Plugin' }, { name: 'Chrome PDF Viewer' }, { name: 'Native Client' }],
});
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Title fragments that identify an anti-bot interstitial.
const INTERSTITIAL_TITLES: &[&str] = &[
    "just a moment",
    "please wait",
    "checking your browser",
    "attention required",
    "access denied",
    "verify you are human",
];

/// Bounded per-state retries for the recovery machine.
const INTERSTITIAL_WAIT_ROUNDS: u32 = 3;
const INTERSTITIAL_WAIT_STEP: Duration = Duration::from_millis(2_000);

/// Page readiness as seen by the recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Loading,
    Interstitial,
    Ready,
    Blocked,
}

/// How to reach the target URL. Tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavStrategy {
    /// Straight `goto(url)`.
    Direct,
    /// Land on the site root first so the navigation carries first-party
    /// cookies and a same-origin referer.
    PreVisit,
    /// Mobile host variant; mobile templates often skip the challenge.
    MobileVariant,
}

impl NavStrategy {
    fn label(&self) -> &'static str {
        match self {
            NavStrategy::Direct => "direct",
            NavStrategy::PreVisit => "pre-visit",
            NavStrategy::MobileVariant => "mobile-variant",
        }
    }
}

/// Feature level of a headless backend instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessMode {
    /// Stealth launch + direct navigation.
    Robust,
    /// Adds human pacing and the full navigation-strategy chain.
    Advanced,
}

/// Owns a running browser and its CDP event pump.
///
/// Normal paths call [`BrowserSession::close`]; `Drop` is the
/// cancellation path and spawns the teardown so an aborted scrape never
/// leaks a Chromium process.
struct BrowserSession {
    browser: Option<Browser>,
    handler_task: tokio::task::JoinHandle<()>,
    /// Captured at launch so `Drop` can spawn teardown even while the
    /// calling task is being torn down itself.
    runtime: tokio::runtime::Handle,
}

impl BrowserSession {
    async fn launch(user_agent: &str) -> Result<Self, ScrapeError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1366, 768)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--lang=en-US")
            .arg("--disable-infobars")
            .arg(format!("--user-agent={user_agent}"))
            .build()
            .map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        // The handler stream must be pumped for the whole session or
        // every CDP call deadlocks.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler_task,
            runtime: tokio::runtime::Handle::current(),
        })
    }

    async fn new_page(&self) -> Result<Page, ScrapeError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Browser("session already closed".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;
        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_JS)
            .build()
            .map_err(ScrapeError::Browser)?;
        page.execute(stealth)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;
        Ok(page)
    }

    /// Explicit teardown, preferred over the `Drop` fallback.
    async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        if let Some(mut browser) = self.browser.take() {
            // Cancellation path: we cannot await here, so spawn the
            // teardown. The process must die either way.
            self.runtime.spawn(async move {
                if let Err(e) = browser.close().await {
                    tracing::warn!("Browser close failed in drop: {}", e);
                }
                let _ = browser.wait().await;
            });
        }
    }
}

/// Headless Chromium extraction strategy.
pub struct HeadlessBackend {
    mode: HeadlessMode,
    limiter: Arc<RequestLimiter>,
}

impl HeadlessBackend {
    pub fn new(mode: HeadlessMode, limiter: Arc<RequestLimiter>) -> Self {
        Self { mode, limiter }
    }

    fn strategies(&self) -> &'static [NavStrategy] {
        match self.mode {
            HeadlessMode::Robust => &[NavStrategy::Direct, NavStrategy::MobileVariant],
            HeadlessMode::Advanced => &[
                NavStrategy::Direct,
                NavStrategy::PreVisit,
                NavStrategy::MobileVariant,
            ],
        }
    }

    /// Drive one navigation strategy to a parsed page.
    async fn attempt(
        &self,
        page: &Page,
        url: &str,
        strategy: NavStrategy,
    ) -> Result<RawPage, ScrapeError> {
        let target = match strategy {
            NavStrategy::MobileVariant => mobile_variant(url),
            _ => url.to_string(),
        };

        if strategy == NavStrategy::PreVisit {
            if let Some(origin) = site_origin(url) {
                navigate(page, &origin).await?;
                human_pause(400, 1_200).await;
            }
        }

        navigate(page, &target).await?;

        match self.recover_to_ready(page, &target).await? {
            PageState::Ready => {}
            _ => return Err(ScrapeError::NavigationBlocked),
        }

        if self.mode == HeadlessMode::Advanced {
            simulate_human(page).await;
        }

        let mut parsed = content_as_page(page).await?;

        // Lazy-loaded rows: one scroll pass, then take what we get.
        if parsed.rows.is_empty() {
            scroll_to_bottom(page).await;
            human_pause(600, 1_400).await;
            parsed = content_as_page(page).await?;
            if parsed.rows.is_empty() {
                tracing::debug!("No track rows after lazy-load pass on {}", target);
            }
        }

        // Partial structure is a valid result here; the orchestrator
        // owns the empty-vs-retry decision for headless output.
        Ok(parsed)
    }

    /// The interstitial recovery state machine.
    async fn recover_to_ready(&self, page: &Page, url: &str) -> Result<PageState, ScrapeError> {
        let mut state = PageState::Loading;
        let mut waits = 0u32;
        let mut clicked = false;
        let mut renavigated = false;

        loop {
            state = match state {
                PageState::Loading => {
                    if is_interstitial(page).await {
                        PageState::Interstitial
                    } else {
                        PageState::Ready
                    }
                }
                PageState::Interstitial => {
                    if waits < INTERSTITIAL_WAIT_ROUNDS {
                        waits += 1;
                        tracing::debug!("Interstitial wait {}/{}", waits, INTERSTITIAL_WAIT_ROUNDS);
                        tokio::time::sleep(INTERSTITIAL_WAIT_STEP).await;
                        if is_interstitial(page).await {
                            PageState::Interstitial
                        } else {
                            PageState::Ready
                        }
                    } else if !clicked {
                        clicked = true;
                        click_continue(page).await;
                        human_pause(1_000, 2_000).await;
                        if is_interstitial(page).await {
                            PageState::Interstitial
                        } else {
                            PageState::Ready
                        }
                    } else if !renavigated {
                        renavigated = true;
                        waits = 0;
                        navigate(page, url).await?;
                        PageState::Loading
                    } else {
                        PageState::Blocked
                    }
                }
                PageState::Ready => return Ok(PageState::Ready),
                PageState::Blocked => return Ok(PageState::Blocked),
            };
        }
    }
}

#[async_trait]
impl ScrapeBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        match self.mode {
            HeadlessMode::Robust => "headless-robust",
            HeadlessMode::Advanced => "headless-advanced",
        }
    }

    async fn fetch(&self, url: &str, options: &ScrapingOptions) -> Result<RawPage, ScrapeError> {
        let _permit = self.limiter.acquire().await;

        let user_agent = static_backend::pick_user_agent(options.user_agent.as_deref());
        let session = BrowserSession::launch(&user_agent).await?;

        let deadline = Duration::from_millis(options.timeout_ms);
        let result = tokio::time::timeout(deadline, self.fetch_with_session(&session, url)).await;

        // Teardown happens on every path, including timeout.
        session.close().await;

        match result {
            Ok(page) => page,
            Err(_) => Err(ScrapeError::Timeout {
                ms: options.timeout_ms,
            }),
        }
    }

    async fn fetch_html(
        &self,
        url: &str,
        options: &ScrapingOptions,
    ) -> Result<String, ScrapeError> {
        let _permit = self.limiter.acquire().await;

        let user_agent = static_backend::pick_user_agent(options.user_agent.as_deref());
        let session = BrowserSession::launch(&user_agent).await?;

        let deadline = Duration::from_millis(options.timeout_ms);
        let result = tokio::time::timeout(deadline, self.html_with_session(&session, url)).await;

        session.close().await;

        match result {
            Ok(html) => html,
            Err(_) => Err(ScrapeError::Timeout {
                ms: options.timeout_ms,
            }),
        }
    }
}

impl HeadlessBackend {
    async fn fetch_with_session(
        &self,
        session: &BrowserSession,
        url: &str,
    ) -> Result<RawPage, ScrapeError> {
        let page = session.new_page().await?;
        let mut outcome: Result<RawPage, ScrapeError> = Err(ScrapeError::NavigationBlocked);

        for strategy in self.strategies() {
            tracing::debug!("Headless navigation strategy: {}", strategy.label());
            match self.attempt(&page, url, *strategy).await {
                Ok(parsed) => {
                    outcome = Ok(parsed);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Strategy {} failed: {}", strategy.label(), e);
                    outcome = Err(e);
                }
            }
        }

        let _ = page.close().await;
        outcome
    }

    /// Raw-HTML path for metadata providers: direct navigation with
    /// interstitial recovery, no tracklist interpretation.
    async fn html_with_session(
        &self,
        session: &BrowserSession,
        url: &str,
    ) -> Result<String, ScrapeError> {
        let page = session.new_page().await?;

        let html = self.html_on_page(&page, url).await;
        let _ = page.close().await;
        html
    }

    async fn html_on_page(&self, page: &Page, url: &str) -> Result<String, ScrapeError> {
        navigate(page, url).await?;
        if self.recover_to_ready(page, url).await? != PageState::Ready {
            return Err(ScrapeError::NavigationBlocked);
        }
        if self.mode == HeadlessMode::Advanced {
            simulate_human(page).await;
        }
        page.content()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }
}

async fn navigate(page: &Page, url: &str) -> Result<(), ScrapeError> {
    page.goto(url)
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?;
    let _ = page.wait_for_navigation().await;
    Ok(())
}

async fn content_as_page(page: &Page) -> Result<RawPage, ScrapeError> {
    let html = page
        .content()
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?;
    Ok(selectors::parse_tracklist_page(&html))
}

/// Interstitial detection by page-title heuristics.
async fn is_interstitial(page: &Page) -> bool {
    let title: String = match page.evaluate("document.title").await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(_) => return false,
    };
    let lower = title.to_lowercase();
    INTERSTITIAL_TITLES.iter().any(|t| lower.contains(t))
}

/// Best-effort click on a challenge continue button.
async fn click_continue(page: &Page) {
    const CLICK_JS: &str = r#"
        (() => {
            const el = document.querySelector(
                'input[type="submit"], button#continue, a.continue, button[type="submit"]'
            );
            if (el) { el.click(); return true; }
            return false;
        })()
    "#;
    if let Err(e) = page.evaluate(CLICK_JS).await {
        tracing::debug!("Continue-click probe failed: {}", e);
    }
}

/// Randomized pointer movement and scrolling; timing jitter is the
/// point, so every delay is drawn fresh.
async fn simulate_human(page: &Page) {
    const WIGGLE_JS: &str = r#"
        (() => {
            const ev = new MouseEvent('mousemove', {
                clientX: 200 + Math.floor(Math.random() * 400),
                clientY: 150 + Math.floor(Math.random() * 300),
                bubbles: true,
            });
            document.dispatchEvent(ev);
            window.scrollBy(0, 120 + Math.floor(Math.random() * 240));
        })()
    "#;
    for _ in 0..2 {
        let _ = page.evaluate(WIGGLE_JS).await;
        human_pause(250, 900).await;
    }
}

async fn scroll_to_bottom(page: &Page) {
    let _ = page
        .evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await;
}

async fn human_pause(min_ms: u64, max_ms: u64) {
    let ms = rand::rng().random_range(min_ms..=max_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn site_origin(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    Some(format!("{}://{}/", parsed.scheme(), parsed.host_str()?))
}

/// Rewrite a URL to its mobile host variant: `www.` becomes `m.`, bare
/// hosts get an `m.` prefix.
fn mobile_variant(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str().map(String::from) else {
        return url.to_string();
    };
    let mobile_host = match host.strip_prefix("www.") {
        Some(rest) => format!("m.{rest}"),
        None if !host.starts_with("m.") => format!("m.{host}"),
        None => host,
    };
    if parsed.set_host(Some(&mobile_host)).is_err() {
        return url.to_string();
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_variant_rewrites_www() {
        assert_eq!(
            mobile_variant("https://www.1001tracklists.com/tracklist/x.html"),
            "https://m.1001tracklists.com/tracklist/x.html"
        );
    }

    #[test]
    fn test_mobile_variant_prefixes_bare_host() {
        assert_eq!(
            mobile_variant("https://tracklists.example/set/1"),
            "https://m.tracklists.example/set/1"
        );
    }

    #[test]
    fn test_mobile_variant_idempotent_on_mobile_host() {
        assert_eq!(
            mobile_variant("https://m.tracklists.example/set/1"),
            "https://m.tracklists.example/set/1"
        );
    }

    #[test]
    fn test_interstitial_title_table() {
        // The heuristic is a plain fragment table; keep it honest.
        for title in ["Just a moment...", "Please Wait | Site", "Checking your browser"] {
            let lower = title.to_lowercase();
            assert!(
                INTERSTITIAL_TITLES.iter().any(|t| lower.contains(t)),
                "{title} should look like an interstitial"
            );
        }
        assert!(!INTERSTITIAL_TITLES
            .iter()
            .any(|t| "Opening Set @ Warehouse".to_lowercase().contains(t)));
    }

    #[test]
    fn test_strategy_order_is_fixed() {
        let limiter = Arc::new(RequestLimiter::default());
        let robust = HeadlessBackend::new(HeadlessMode::Robust, limiter.clone());
        let advanced = HeadlessBackend::new(HeadlessMode::Advanced, limiter);

        assert_eq!(
            robust.strategies(),
            &[NavStrategy::Direct, NavStrategy::MobileVariant]
        );
        assert_eq!(
            advanced.strategies(),
            &[
                NavStrategy::Direct,
                NavStrategy::PreVisit,
                NavStrategy::MobileVariant
            ]
        );
    }
}
