//! Metadata lookup command.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::metadata::{CatalogProvider, FallbackProvider, MetadataAggregator};
use crate::scraper::headless::{HeadlessBackend, HeadlessMode};
use crate::scraper::Scraper;

/// Build the aggregator with the same request budget as the scraper.
pub fn build_aggregator(config: &Config, scraper: &Scraper) -> MetadataAggregator {
    let catalog_backend = Arc::new(HeadlessBackend::new(
        HeadlessMode::Robust,
        scraper.limiter(),
    ));
    let catalog = Arc::new(CatalogProvider::new(
        catalog_backend,
        config.providers.catalog_enabled && config.scraper.headless_enabled,
    ));
    let fallback = Arc::new(FallbackProvider::new(
        scraper.limiter(),
        config.providers.fallback_enabled,
    ));
    MetadataAggregator::new(catalog, fallback)
}

/// Look up one track and print whatever was found.
pub fn cmd_search(
    rt: &Runtime,
    config: &Config,
    title: &str,
    artist: &str,
    enrich: bool,
    json: bool,
) -> anyhow::Result<()> {
    let scraper = Scraper::new(config);
    let aggregator = build_aggregator(config, &scraper);

    rt.block_on(async {
        let meta = aggregator.search_metadata(title, artist, enrich).await;

        if json {
            println!("{}", serde_json::to_string_pretty(&meta)?);
            return Ok(());
        }

        if !meta.has_any_field() {
            println!("✗ Nothing found for \"{artist} - {title}\".");
            if enrich && !config.providers.catalog_enabled {
                println!("  The catalog provider is disabled in config.");
            }
            return Ok(());
        }

        println!("✓ {artist} - {title}");
        if let Some(ref album) = meta.album {
            println!("  Album: {album}");
        }
        if let Some(year) = meta.year {
            println!("  Year:  {year}");
        }
        if let Some(ref genre) = meta.genre {
            println!("  Genre: {genre}");
        }
        if let Some(ref label) = meta.label {
            println!("  Label: {label}");
        }
        if let Some(bpm) = meta.bpm {
            println!("  BPM:   {bpm:.0}");
        }
        if let Some(ref key) = meta.key {
            println!("  Key:   {key}");
        }
        if let Some(duration) = meta.duration {
            println!(
                "  Length: {}",
                crate::scraper::postprocess::format_duration(duration)
            );
        }
        println!();
        println!("  Sources: {}", meta.sources.join(", "));
        Ok(())
    })
}
