//! Lightweight fallback metadata provider.
//!
//! Structured lookups against the iTunes Search API: keyless, fast,
//! and good enough for album/genre/year when full catalog enrichment
//! was not requested. Requests are paced through the shared limiter.
//!
//! See: https://developer.apple.com/library/archive/documentation/AudioVideo/Conceptual/iTuneSearchAPI/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::domain::{EnhancedMetadata, MetadataError, ProviderHit};
use super::traits::MetadataProvider;
use crate::matcher;
use crate::ratelimit::RequestLimiter;

/// Structured-lookup results are trustworthy but coarse (no BPM/key).
const FALLBACK_CONFIDENCE: f32 = 0.6;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Exact API response shapes. These change when Apple changes them,
/// which is why nothing outside this file sees them.
mod dto {
    use super::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct SearchResponse {
        #[serde(default)]
        pub results: Vec<SearchResult>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SearchResult {
        pub track_name: Option<String>,
        pub artist_name: Option<String>,
        pub collection_name: Option<String>,
        pub release_date: Option<String>,
        pub primary_genre_name: Option<String>,
        pub track_time_millis: Option<u64>,
    }
}

/// Convert a DTO result into our domain type.
fn to_metadata(result: &dto::SearchResult, title: &str, artist: &str) -> EnhancedMetadata {
    let mut metadata = EnhancedMetadata::new(title, artist);
    metadata.album = result.collection_name.clone();
    metadata.genre = result.primary_genre_name.clone();
    // releaseDate is ISO 8601; the leading year is all we keep.
    metadata.year = result
        .release_date
        .as_deref()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok());
    metadata.duration = result
        .track_time_millis
        .map(Duration::from_millis);
    metadata
}

/// Keyless structured-lookup provider.
pub struct FallbackProvider {
    http_client: reqwest::Client,
    limiter: Arc<RequestLimiter>,
    base_url: String,
    enabled: bool,
}

impl FallbackProvider {
    pub fn new(limiter: Arc<RequestLimiter>, enabled: bool) -> Self {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            limiter,
            base_url: "https://itunes.apple.com".to_string(),
            enabled,
        }
    }

    /// Create a provider for testing with custom base URL.
    #[cfg(test)]
    pub fn with_base_url(limiter: Arc<RequestLimiter>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            limiter,
            base_url: base_url.into(),
            enabled: true,
        }
    }

    async fn send_search_request(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<dto::SearchResponse, MetadataError> {
        let term = format!("{artist} {title}");
        let url = format!(
            "{}/search?term={}&media=music&entity=song&limit=5",
            self.base_url,
            urlencoding::encode(term.trim())
        );

        let _permit = self.limiter.acquire().await;
        let response = self
            .http_client
            .get(&url)
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetadataError::Timeout {
                        ms: LOOKUP_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    MetadataError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| MetadataError::Parse(e.to_string()))
    }
}

/// Pick the result that actually is the requested track, reusing the
/// candidate scorer over the "Artist - Title" rendering.
fn pick_best<'a>(
    results: &'a [dto::SearchResult],
    title: &str,
    artist: &str,
) -> Option<&'a dto::SearchResult> {
    let anchors: Vec<(String, String)> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let text = format!(
                "{} - {}",
                r.artist_name.as_deref().unwrap_or_default(),
                r.track_name.as_deref().unwrap_or_default()
            );
            (text, i.to_string())
        })
        .collect();
    let winner = matcher::best_match(anchors, title, artist)?;
    let index: usize = winner.href.parse().ok()?;
    results.get(index)
}

#[async_trait]
impl MetadataProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "itunes"
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    async fn search(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<ProviderHit>, MetadataError> {
        if !self.enabled {
            return Err(MetadataError::ProviderUnavailable(self.name().to_string()));
        }
        let response = self.send_search_request(title, artist).await?;
        let Some(best) = pick_best(&response.results, title, artist) else {
            tracing::debug!("No confident fallback result for \"{} - {}\"", artist, title);
            return Ok(None);
        };

        let metadata = to_metadata(best, title, artist);
        if !metadata.has_any_field() {
            return Ok(None);
        }
        Ok(Some(ProviderHit {
            metadata,
            confidence: FALLBACK_CONFIDENCE,
        }))
    }
}
