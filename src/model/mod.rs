//! Core data models for scraped tracklists.
//!
//! Defines the primary entities returned by the scraping engine:
//! [`Track`], [`TrackLink`], [`PlaylistMetadata`] and [`ScrapingResult`],
//! plus the [`ScrapingOptions`] callers use to drive a scrape.
//!
//! Result types are built once per call and owned by the caller after
//! return; nothing in the engine mutates them afterwards.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A streaming/store platform a track link can point at.
///
/// The set is closed: anything we cannot classify is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    Spotify,
    YouTube,
    SoundCloud,
    Beatport,
    AppleMusic,
    Tidal,
    Deezer,
    Other,
}

impl Platform {
    /// Stable lowercase name, used in stats output and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
            Platform::YouTube => "youtube",
            Platform::SoundCloud => "soundcloud",
            Platform::Beatport => "beatport",
            Platform::AppleMusic => "applemusic",
            Platform::Tidal => "tidal",
            Platform::Deezer => "deezer",
            Platform::Other => "other",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound link attached to a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackLink {
    pub platform: Platform,
    pub url: String,
    /// False until a HEAD probe confirms the URL resolves.
    pub verified: bool,
}

impl TrackLink {
    pub fn new(platform: Platform, url: impl Into<String>) -> Self {
        Self {
            platform,
            url: url.into(),
            verified: false,
        }
    }
}

/// Per-track metadata block filled by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub genre: Option<String>,
    pub bpm: Option<f32>,
    pub key: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<Duration>,
}

/// A single entry in a scraped tracklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Position-derived identifier, unique within one result.
    pub id: String,
    /// Track title. Never empty after whitespace normalization.
    pub title: String,
    pub artist: Option<String>,
    /// Remix/version annotation when the source lists it separately.
    pub remix: Option<String>,
    pub label: Option<String>,
    /// Cue time within the set, as displayed by the source ("1:02:45").
    pub time: Option<String>,
    /// 1-based position in the tracklist.
    pub position: Option<u32>,
    /// Outbound links, unique by (platform, url), insertion-ordered.
    pub links: Vec<TrackLink>,
    pub metadata: Option<TrackMetadata>,
}

impl Track {
    /// Build a track from raw scraped text.
    ///
    /// Returns `None` when the title is empty after whitespace
    /// normalization; such rows are junk (ads, separators) and are
    /// dropped at the extraction boundary.
    pub fn new(position: u32, raw_title: &str) -> Option<Self> {
        let title = normalize_whitespace(raw_title);
        if title.is_empty() {
            return None;
        }
        Some(Self {
            id: format!("track-{position}"),
            title,
            artist: None,
            remix: None,
            label: None,
            time: None,
            position: Some(position),
            links: Vec::new(),
            metadata: None,
        })
    }

    /// Attach a link, keeping links unique by (platform, url).
    pub fn add_link(&mut self, link: TrackLink) {
        let dup = self
            .links
            .iter()
            .any(|l| l.platform == link.platform && l.url == link.url);
        if !dup {
            self.links.push(link);
        }
    }
}

/// Metadata describing the scraped page itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub title: String,
    pub artist: String,
    pub venue: Option<String>,
    pub date: Option<String>,
    pub url: String,
    pub total_tracks: usize,
    pub scraped_at: DateTime<Utc>,
}

/// Aggregate statistics over a [`ScrapingResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeStats {
    pub total_tracks: usize,
    pub tracks_with_links: usize,
    /// Distinct platforms seen across all links. BTreeSet keeps the
    /// serialized order deterministic.
    pub platforms: BTreeSet<Platform>,
    /// Wall-clock time of the scrape in milliseconds.
    pub scraping_time_ms: u64,
    /// Backend that produced the result ("static", "headless-robust", ...).
    pub method: String,
}

impl ScrapeStats {
    /// Recompute track/link/platform counts from a track list.
    /// Timing and method are left untouched.
    pub fn recompute(&mut self, tracks: &[Track]) {
        self.total_tracks = tracks.len();
        self.tracks_with_links = tracks.iter().filter(|t| !t.links.is_empty()).count();
        self.platforms = tracks
            .iter()
            .flat_map(|t| t.links.iter().map(|l| l.platform))
            .collect();
    }
}

/// The outcome of one `scrape()` call.
///
/// This is always a returned value, never an error: a scrape that
/// exhausts its retries produces `success: false` with diagnostics in
/// `errors`, not an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingResult {
    pub success: bool,
    pub metadata: Option<PlaylistMetadata>,
    pub tracks: Vec<Track>,
    pub stats: ScrapeStats,
    /// Diagnostic messages only; absent data is represented by `None`
    /// fields, not entries here.
    pub errors: Vec<String>,
}

impl ScrapingResult {
    /// A degraded result carrying only diagnostics.
    pub fn failure(url: &str, method: &str, errors: Vec<String>) -> Self {
        Self {
            success: false,
            metadata: Some(PlaylistMetadata {
                title: String::new(),
                artist: String::new(),
                venue: None,
                date: None,
                url: url.to_string(),
                total_tracks: 0,
                scraped_at: Utc::now(),
            }),
            tracks: Vec::new(),
            stats: ScrapeStats {
                method: method.to_string(),
                ..Default::default()
            },
            errors,
        }
    }
}

/// Which extraction backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapeMethod {
    /// Pick automatically: static fetch first unless headless is forced.
    #[default]
    Auto,
    /// Plain HTTP GET + HTML parsing.
    Static,
    /// Headless browser with anti-detection measures.
    HeadlessRobust,
    /// Headless browser with full human-pacing simulation.
    HeadlessAdvanced,
}

impl ScrapeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMethod::Auto => "auto",
            ScrapeMethod::Static => "static",
            ScrapeMethod::HeadlessRobust => "headless-robust",
            ScrapeMethod::HeadlessAdvanced => "headless-advanced",
        }
    }
}

/// Options accepted by `Scraper::scrape`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Attempt count for the retry loop.
    pub retries: u32,
    /// Base backoff delay in milliseconds (doubled per attempt, jittered).
    pub delay_ms: u64,
    pub use_cache: bool,
    pub cache_ttl_secs: u64,
    pub method: ScrapeMethod,
    /// Overrides the rotated user-agent pool when set.
    pub user_agent: Option<String>,
    /// HEAD-probe each track link after extraction.
    pub validate_links: bool,
    /// Parse and normalize duration/cue strings.
    pub include_metadata: bool,
    /// Route enrichment through the catalog-scrape provider.
    pub enrich: bool,
}

impl Default for ScrapingOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: 3,
            delay_ms: 1_000,
            use_cache: true,
            cache_ttl_secs: 3_600,
            method: ScrapeMethod::Auto,
            user_agent: None,
            validate_links: false,
            include_metadata: false,
            enrich: false,
        }
    }
}

impl ScrapingOptions {
    /// Canonical string form used in the cache fingerprint.
    ///
    /// Only fields that change the scraped payload participate; cache
    /// bookkeeping fields (use_cache, cache_ttl_secs, retries, delay)
    /// deliberately do not, so retuning them still hits the same entry.
    pub fn fingerprint_component(&self) -> String {
        format!(
            "method={};ua={};links={};meta={};enrich={}",
            self.method.as_str(),
            self.user_agent.as_deref().unwrap_or("-"),
            self.validate_links,
            self.include_metadata,
            self.enrich,
        )
    }
}

/// Collapse internal whitespace runs and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_title_normalized() {
        let track = Track::new(1, "  Strobe \t (Club  Edit) ").unwrap();
        assert_eq!(track.title, "Strobe (Club Edit)");
    }

    #[test]
    fn test_track_empty_title_rejected() {
        assert!(Track::new(1, "   \t ").is_none());
        assert!(Track::new(2, "").is_none());
    }

    #[test]
    fn test_track_links_unique_by_platform_and_url() {
        let mut track = Track::new(1, "Strobe").unwrap();
        track.add_link(TrackLink::new(Platform::Spotify, "https://spotify.com/a"));
        track.add_link(TrackLink::new(Platform::Spotify, "https://spotify.com/a"));
        track.add_link(TrackLink::new(Platform::Spotify, "https://spotify.com/b"));
        assert_eq!(track.links.len(), 2);
    }

    #[test]
    fn test_stats_recompute() {
        let mut with_links = Track::new(1, "A").unwrap();
        with_links.add_link(TrackLink::new(Platform::YouTube, "https://youtu.be/x"));
        with_links.add_link(TrackLink::new(Platform::Beatport, "https://beatport.com/y"));
        let bare = Track::new(2, "B").unwrap();

        let mut stats = ScrapeStats::default();
        stats.recompute(&[with_links, bare]);

        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.tracks_with_links, 1);
        assert!(stats.platforms.contains(&Platform::YouTube));
        assert!(stats.platforms.contains(&Platform::Beatport));
        assert_eq!(stats.platforms.len(), 2);
    }

    #[test]
    fn test_default_options() {
        let opts = ScrapingOptions::default();
        assert_eq!(opts.timeout_ms, 30_000);
        assert_eq!(opts.retries, 3);
        assert_eq!(opts.delay_ms, 1_000);
        assert!(opts.use_cache);
        assert_eq!(opts.cache_ttl_secs, 3_600);
        assert_eq!(opts.method, ScrapeMethod::Auto);
    }

    #[test]
    fn test_fingerprint_ignores_cache_tuning() {
        let a = ScrapingOptions::default();
        let b = ScrapingOptions {
            retries: 10,
            delay_ms: 50,
            cache_ttl_secs: 5,
            ..Default::default()
        };
        assert_eq!(a.fingerprint_component(), b.fingerprint_component());

        let c = ScrapingOptions {
            method: ScrapeMethod::Static,
            ..Default::default()
        };
        assert_ne!(a.fingerprint_component(), c.fingerprint_component());
    }
}
