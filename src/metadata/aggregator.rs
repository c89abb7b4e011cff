//! Metadata aggregation across providers.
//!
//! Provider selection is exclusive, not pooled: a caller that asked for
//! enrichment gets the catalog-scrape provider and nothing else; one
//! that didn't gets the lightweight fallback. Within the selected set,
//! providers run sequentially and stop as soon as one yields a usable
//! field.
//!
//! Merging is confidence-ordered: the highest-confidence hit seeds the
//! result, lower hits only backfill missing fields, and a numeric BPM
//! reported by several sources is averaged. Provider failures are
//! logged and swallowed — the aggregator always returns whatever could
//! be assembled, even if that is just the echoed search target.

use std::sync::Arc;

use super::domain::{EnhancedMetadata, ProviderHit};
use super::traits::MetadataProvider;

/// Sequences providers and merges their partial results.
pub struct MetadataAggregator {
    catalog: Arc<dyn MetadataProvider>,
    fallback: Arc<dyn MetadataProvider>,
}

impl MetadataAggregator {
    pub fn new(catalog: Arc<dyn MetadataProvider>, fallback: Arc<dyn MetadataProvider>) -> Self {
        Self { catalog, fallback }
    }

    /// Look up one track across the selected providers.
    ///
    /// Never fails: operational errors degrade to an empty result that
    /// still echoes the search target.
    pub async fn search_metadata(
        &self,
        title: &str,
        artist: &str,
        enrich: bool,
    ) -> EnhancedMetadata {
        let providers: Vec<&Arc<dyn MetadataProvider>> = if enrich {
            vec![&self.catalog]
        } else {
            vec![&self.fallback]
        };

        let mut hits: Vec<(&'static str, ProviderHit)> = Vec::new();
        for provider in providers {
            if !provider.is_configured() {
                tracing::warn!("Provider {} is not configured, skipping", provider.name());
                continue;
            }
            match provider.search(title, artist).await {
                Ok(Some(hit)) => {
                    let usable = hit.metadata.has_any_field();
                    hits.push((provider.name(), hit));
                    if usable {
                        // Short-circuit: first provider with data wins
                        // the sequencing; merging handles the rest.
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("Provider {} found nothing for \"{} - {}\"",
                        provider.name(), artist, title);
                }
                Err(e) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
            }
        }

        merge_hits(title, artist, hits)
    }
}

/// Merge provider hits by confidence (descending).
///
/// The highest-confidence hit seeds the result; every field it lacks is
/// backfilled from the remaining hits in order. BPM values from more
/// than one source are averaged, since catalogs round differently.
pub fn merge_hits(
    title: &str,
    artist: &str,
    mut hits: Vec<(&'static str, ProviderHit)>,
) -> EnhancedMetadata {
    hits.sort_by(|a, b| {
        b.1.confidence
            .partial_cmp(&a.1.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut result = EnhancedMetadata::new(title, artist);
    for (_, hit) in &hits {
        result.backfill_from(&hit.metadata);
    }

    let bpms: Vec<f32> = hits.iter().filter_map(|(_, h)| h.metadata.bpm).collect();
    if bpms.len() > 1 {
        result.bpm = Some(bpms.iter().sum::<f32>() / bpms.len() as f32);
    }

    result.confidence = hits.first().map(|(_, h)| h.confidence);
    result.sources = hits.iter().map(|(name, _)| name.to_string()).collect();
    result
}
