//! Catalog-scrape metadata provider.
//!
//! Drives a headless backend against the catalog site: search for the
//! track, pick the right result with the candidate matcher, open the
//! detail page, and pull BPM / key / genre / label / year out of it.
//!
//! Field extraction is a three-tier fallback per field:
//! 1. ordered CSS selector chains (fast, breaks on redesigns),
//! 2. labeled-row/table-column heuristics ("BPM: 128" rows),
//! 3. whole-page regex with validity predicates (last resort).
//!
//! The entire search→match→navigate→extract pipeline races one hard
//! deadline. On timeout the provider fails soft with `Ok(None)` — a
//! slow catalog page must not stall the download pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::domain::{EnhancedMetadata, MetadataError, ProviderHit};
use super::traits::MetadataProvider;
use crate::matcher;
use crate::model::{normalize_whitespace, ScrapingOptions};
use crate::scraper::backend::ScrapeBackend;

/// Confidence declared for catalog hits. The catalog is authoritative
/// for BPM/key/genre, hence the high value.
const CATALOG_CONFIDENCE: f32 = 0.9;

/// Hard wall-clock budget for one track's full pipeline.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(20);

/// Per-page fetch budget within the pipeline.
const PAGE_TIMEOUT_MS: u64 = 15_000;

/// Plausible electronic-music BPM range; values outside are selector
/// noise (track counts, prices, years).
const BPM_RANGE: std::ops::RangeInclusive<f32> = 60.0..=200.0;

static BPM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2,3})\s*BPM\b").expect("static regex"));
static BPM_LABELED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBPM\b[:\s]*(\d{2,3})\b").expect("static regex"));
static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-G][#♭b]?)\s*(Major|Minor|Maj|Min)\b").expect("static regex")
});
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("static regex"));

/// Curated genre vocabulary, longest phrases first so "tech house"
/// beats "house".
const GENRES: &[&str] = &[
    "progressive house",
    "melodic techno",
    "drum and bass",
    "drum & bass",
    "organic house",
    "afro house",
    "bass house",
    "deep house",
    "tech house",
    "big room",
    "indie dance",
    "hard techno",
    "psytrance",
    "hardstyle",
    "downtempo",
    "electronica",
    "dubstep",
    "breaks",
    "electro",
    "techno",
    "trance",
    "garage",
    "ambient",
    "minimal",
    "house",
];

/// Scrapes the public catalog site for per-track attributes.
pub struct CatalogProvider {
    backend: Arc<dyn ScrapeBackend>,
    base_url: String,
    enabled: bool,
    deadline: Duration,
}

impl CatalogProvider {
    pub fn new(backend: Arc<dyn ScrapeBackend>, enabled: bool) -> Self {
        Self {
            backend,
            base_url: "https://www.beatport.com".to_string(),
            enabled,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Create a provider for testing with a custom deadline.
    #[cfg(test)]
    pub fn with_deadline(backend: Arc<dyn ScrapeBackend>, deadline: Duration) -> Self {
        Self {
            backend,
            base_url: "https://www.beatport.com".to_string(),
            enabled: true,
            deadline,
        }
    }

    fn fetch_options(&self) -> ScrapingOptions {
        ScrapingOptions {
            timeout_ms: PAGE_TIMEOUT_MS,
            use_cache: false,
            ..Default::default()
        }
    }

    /// The un-raced pipeline; [`MetadataProvider::search`] wraps it in
    /// the deadline.
    async fn search_inner(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<ProviderHit>, MetadataError> {
        let query = format!("{artist} {title}");
        let search_url = format!(
            "{}/search/tracks?q={}",
            self.base_url,
            urlencoding::encode(query.trim())
        );

        let options = self.fetch_options();
        let search_html = self.backend.fetch_html(&search_url, &options).await?;
        let anchors = extract_track_anchors(&search_html, &self.base_url);
        if anchors.is_empty() {
            tracing::debug!("Catalog search returned no track anchors for {:?}", query);
            return Ok(None);
        }

        let Some(candidate) = matcher::best_match(anchors, title, artist) else {
            return Ok(None);
        };

        let detail_html = self.backend.fetch_html(&candidate.href, &options).await?;
        let metadata = extract_detail_fields(&detail_html, title, artist);
        if !metadata.has_any_field() {
            tracing::debug!("Catalog detail page had no extractable fields for {:?}", query);
            return Ok(None);
        }

        Ok(Some(ProviderHit {
            metadata,
            confidence: CATALOG_CONFIDENCE,
        }))
    }
}

#[async_trait]
impl MetadataProvider for CatalogProvider {
    fn name(&self) -> &'static str {
        "catalog"
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
        match tokio::time::timeout(self.deadline, self.search_inner(title, artist)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Catalog lookup for \"{} - {}\" exceeded {}ms deadline",
                    artist,
                    title,
                    self.deadline.as_millis()
                );
                Ok(None)
            }
        }
    }
}

/// Track anchors from a search results page, hrefs made absolute.
fn extract_track_anchors(html: &str, base_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href*=\"/track/\"]") else {
        return Vec::new();
    };
    let base = url::Url::parse(base_url).ok();

    document
        .select(&selector)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let text = normalize_whitespace(&anchor.text().collect::<String>());
            if text.is_empty() {
                return None;
            }
            let absolute = match &base {
                Some(base) => base
                    .join(href)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| href.to_string()),
                None => href.to_string(),
            };
            Some((text, absolute))
        })
        .collect()
}

/// Run all field extractors over a detail page.
fn extract_detail_fields(html: &str, title: &str, artist: &str) -> EnhancedMetadata {
    let document = Html::parse_document(html);
    let text = page_text(&document);

    let mut metadata = EnhancedMetadata::new(title, artist);
    metadata.bpm = extract_bpm(&document, &text);
    metadata.key = extract_key(&document, &text);
    metadata.genre = extract_genre(&document, &text);
    metadata.label = extract_label(&document, &text);
    metadata.year = extract_year(&document, &text);
    metadata
}

fn page_text(document: &Html) -> String {
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    document
        .select(&body)
        .flat_map(|el| el.text())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First usable text for an ordered list of selectors.
fn select_first(document: &Html, selectors: &[&str]) -> Option<String> {
    for css in selectors {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(value) = document
            .select(&selector)
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .find(|v| !v.is_empty())
        {
            return Some(value);
        }
    }
    None
}

/// Tier-b heuristic: a row/cell whose text reads "Label: value" or a
/// table row with the label in the first column.
fn labeled_value(document: &Html, label: &str) -> Option<String> {
    for css in ["li", "tr", "div", "dd"] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = normalize_whitespace(&element.text().collect::<String>());
            let prefix_matches = text
                .get(..label.len())
                .is_some_and(|p| p.eq_ignore_ascii_case(label));
            if !prefix_matches {
                continue;
            }
            let value = text[label.len()..]
                .trim_start_matches([':', ' ', '\t'])
                .trim()
                .to_string();
            // A bare label cell, or a container swallowing the whole
            // stats block, is not a value.
            if !value.is_empty() && value.len() <= 48 {
                return Some(value);
            }
        }
    }
    None
}

fn extract_bpm(document: &Html, text: &str) -> Option<f32> {
    let validate = |raw: &str| -> Option<f32> {
        let bpm: f32 = raw.trim().parse().ok()?;
        BPM_RANGE.contains(&bpm).then_some(bpm)
    };

    select_first(
        document,
        &[".interior-track-bpm", "[data-bpm]", "li.bpm span.value"],
    )
    .and_then(|v| validate(&v))
    .or_else(|| labeled_value(document, "BPM").and_then(|v| validate(&v)))
    .or_else(|| {
        BPM_RE
            .captures(text)
            .or_else(|| BPM_LABELED_RE.captures(text))
            .and_then(|c| validate(&c[1]))
    })
}

fn extract_key(document: &Html, text: &str) -> Option<String> {
    let validate = |raw: &str| -> Option<String> {
        let caps = KEY_RE.captures(raw)?;
        let raw_note = caps[1].replace('♭', "b");
        let mut chars = raw_note.chars();
        let note = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => raw_note.clone(),
        };
        let quality = match caps[2].to_lowercase().as_str() {
            "major" | "maj" => "Major",
            _ => "Minor",
        };
        Some(format!("{note} {quality}"))
    };

    select_first(document, &[".interior-track-key", "li.key span.value"])
        .and_then(|v| validate(&v))
        .or_else(|| labeled_value(document, "Key").and_then(|v| validate(&v)))
        .or_else(|| validate(text))
}

fn extract_genre(document: &Html, text: &str) -> Option<String> {
    let from_selectors = select_first(
        document,
        &["a[href*=\"/genre/\"]", ".interior-track-genre"],
    )
    .map(|v| clean_genre_tokens(&v));
    if let Some(genre) = from_selectors.filter(|g| !g.is_empty()) {
        return Some(genre);
    }

    if let Some(genre) = labeled_value(document, "Genre").map(|v| clean_genre_tokens(&v)) {
        if !genre.is_empty() {
            return Some(genre);
        }
    }

    // Last resort: vocabulary scan over the whole page.
    let lower = text.to_lowercase();
    GENRES
        .iter()
        .find(|genre| lower.contains(*genre))
        .map(|genre| title_case(genre))
}

/// Strip stray tokens around a genre string and canonicalize casing
/// when the remainder is in the vocabulary.
fn clean_genre_tokens(raw: &str) -> String {
    let cleaned = raw
        .trim_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string();
    let lower = cleaned.to_lowercase();
    match GENRES.iter().find(|g| **g == lower) {
        Some(canonical) => title_case(canonical),
        None => cleaned,
    }
}

fn title_case(phrase: &str) -> String {
    phrase
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_label(document: &Html, _text: &str) -> Option<String> {
    select_first(
        document,
        &["a[href*=\"/label/\"]", ".interior-track-labels a"],
    )
    .or_else(|| labeled_value(document, "Label"))
}

fn extract_year(document: &Html, text: &str) -> Option<i32> {
    let validate = |raw: &str| -> Option<i32> {
        YEAR_RE.captures(raw).and_then(|c| c[1].parse().ok())
    };
    labeled_value(document, "Released")
        .and_then(|v| validate(&v))
        .or_else(|| validate(text))
}
