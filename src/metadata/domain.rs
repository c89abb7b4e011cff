//! Internal domain models for metadata enrichment.
//!
//! These types are OUR types - they don't change when a catalog site
//! redesigns or a lookup API reshapes its JSON. Provider responses are
//! converted into these at the provider boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Enriched track attributes assembled from one or more providers.
///
/// Absent attributes stay `None` for graceful partial rendering; they
/// are never encoded as error values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub bpm: Option<f32>,
    pub key: Option<String>,
    pub duration: Option<Duration>,
    pub isrc: Option<String>,
    /// Aggregate confidence of the merged result (0.0 to 1.0).
    pub confidence: Option<f32>,
    /// Names of every provider that contributed a field.
    pub sources: Vec<String>,
}

impl EnhancedMetadata {
    /// Empty result echoing the search target.
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }

    /// True when at least one enrichment field is populated.
    pub fn has_any_field(&self) -> bool {
        self.album.is_some()
            || self.year.is_some()
            || self.genre.is_some()
            || self.label.is_some()
            || self.bpm.is_some()
            || self.key.is_some()
            || self.duration.is_some()
            || self.isrc.is_some()
    }

    /// Fill any missing field from a lower-confidence result,
    /// never overwriting values already present.
    pub fn backfill_from(&mut self, other: &EnhancedMetadata) {
        if self.album.is_none() {
            self.album = other.album.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.genre.is_none() {
            self.genre = other.genre.clone();
        }
        if self.label.is_none() {
            self.label = other.label.clone();
        }
        if self.bpm.is_none() {
            self.bpm = other.bpm;
        }
        if self.key.is_none() {
            self.key = other.key.clone();
        }
        if self.duration.is_none() {
            self.duration = other.duration;
        }
        if self.isrc.is_none() {
            self.isrc = other.isrc.clone();
        }
    }
}

/// One provider's answer, with its self-declared trust.
#[derive(Debug, Clone)]
pub struct ProviderHit {
    pub metadata: EnhancedMetadata,
    /// Confidence in this hit (0.0 to 1.0), used to order merging.
    pub confidence: f32,
}

/// Errors that can occur during metadata lookup.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Provider {0} is not configured")]
    ProviderUnavailable(String),

    #[error("Lookup timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Search page scrape failed: {0}")]
    Scrape(#[from] crate::scraper::ScrapeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backfill_never_overwrites() {
        let mut seed = EnhancedMetadata::new("Strobe", "deadmau5");
        seed.bpm = Some(128.0);

        let mut other = EnhancedMetadata::new("Strobe", "deadmau5");
        other.bpm = Some(130.0); // Must NOT override
        other.genre = Some("Progressive House".to_string()); // Must fill in

        seed.backfill_from(&other);
        assert_eq!(seed.bpm, Some(128.0));
        assert_eq!(seed.genre.as_deref(), Some("Progressive House"));
    }

    #[test]
    fn test_has_any_field() {
        let mut meta = EnhancedMetadata::new("Strobe", "deadmau5");
        assert!(!meta.has_any_field());
        meta.key = Some("C# Minor".to_string());
        assert!(meta.has_any_field());
    }
}
