//! Tracklist scraping command.

use tokio::runtime::Runtime;

use super::search::build_aggregator;
use crate::config::Config;
use crate::metadata::MetadataAggregator;
use crate::model::{ScrapeMethod, ScrapingOptions, Track, TrackMetadata};
use crate::scraper::{ScrapeError, Scraper};

pub struct ScrapeArgs {
    pub method: ScrapeMethod,
    pub no_cache: bool,
    pub validate_links: bool,
    pub metadata: bool,
    pub enrich: bool,
    pub timeout_ms: u64,
    pub retries: u32,
    pub json: bool,
}

/// Scrape one tracklist page and print the result.
pub fn cmd_scrape(rt: &Runtime, config: &Config, url: &str, args: ScrapeArgs) -> anyhow::Result<()> {
    let options = ScrapingOptions {
        timeout_ms: args.timeout_ms,
        retries: args.retries,
        use_cache: !args.no_cache,
        method: args.method,
        validate_links: args.validate_links,
        include_metadata: args.metadata,
        enrich: args.enrich,
        ..Default::default()
    };

    let scraper = Scraper::new(config);

    rt.block_on(async {
        let mut result = match scraper.scrape(url, &options).await {
            Ok(result) => result,
            Err(ScrapeError::InvalidInput(reason)) => {
                eprintln!("Error: invalid URL: {reason}");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };

        if result.success && args.enrich {
            let aggregator = build_aggregator(config, &scraper);
            enrich_tracks(&aggregator, &mut result.tracks).await;
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if !result.success {
            println!("✗ Scrape failed after {} error(s):", result.errors.len());
            for error in &result.errors {
                println!("  - {error}");
            }
            std::process::exit(1);
        }

        if let Some(ref meta) = result.metadata {
            println!("✓ {} — {}", meta.artist, meta.title);
            if let Some(ref venue) = meta.venue {
                println!("  Venue: {venue}");
            }
            if let Some(ref date) = meta.date {
                println!("  Date:  {date}");
            }
            println!();
        }

        for track in &result.tracks {
            let position = track
                .position
                .map(|p| format!("{p:02}"))
                .unwrap_or_else(|| "--".to_string());
            let artist = track.artist.as_deref().unwrap_or("ID");
            print!("  {position}. {artist} - {}", track.title);
            if let Some(ref time) = track.time {
                print!("  [{time}]");
            }
            if let Some(ref meta) = track.metadata {
                if let Some(bpm) = meta.bpm {
                    print!("  {bpm:.0}bpm");
                }
                if let Some(ref key) = meta.key {
                    print!(" {key}");
                }
            }
            if !track.links.is_empty() {
                let platforms: Vec<&str> =
                    track.links.iter().map(|l| l.platform.as_str()).collect();
                print!("  ({})", platforms.join(", "));
            }
            println!();
        }

        println!();
        println!(
            "{} tracks ({} with links) via {} in {}ms",
            result.stats.total_tracks,
            result.stats.tracks_with_links,
            result.stats.method,
            result.stats.scraping_time_ms
        );
        if !result.errors.is_empty() {
            println!("  {} earlier attempt(s) failed before success", result.errors.len());
        }
        Ok(())
    })
}

/// Enrich each track in place through the catalog provider.
/// Tracks are processed one at a time; the providers pace their own
/// outbound requests.
async fn enrich_tracks(aggregator: &MetadataAggregator, tracks: &mut [Track]) {
    let total = tracks.len();
    for (i, track) in tracks.iter_mut().enumerate() {
        let Some(artist) = track.artist.clone() else {
            continue;
        };
        let found = aggregator.search_metadata(&track.title, &artist, true).await;
        if !found.has_any_field() {
            continue;
        }
        let meta = track.metadata.get_or_insert_with(TrackMetadata::default);
        meta.genre = found.genre.or(meta.genre.take());
        meta.bpm = found.bpm.or(meta.bpm);
        meta.key = found.key.or(meta.key.take());
        meta.year = found.year.or(meta.year);
        meta.duration = found.duration.or(meta.duration);

        if (i + 1) % 10 == 0 {
            tracing::info!("Enriched {}/{} tracks", i + 1, total);
        }
    }
}
