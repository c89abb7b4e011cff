//! CLI argument definitions and command dispatch.

mod cache;
mod scrape;
mod search;

use clap::{Parser, Subcommand};

use crate::model::ScrapeMethod;

/// Tracklist scraping and metadata enrichment engine.
#[derive(Parser)]
#[command(name = "cratedigger", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape a tracklist page into structured tracks
    Scrape {
        /// Tracklist page URL
        url: String,

        /// Extraction strategy
        #[arg(long, value_enum, default_value_t = ScrapeMethod::Auto)]
        method: ScrapeMethod,

        /// Skip the cache and force a fresh scrape
        #[arg(long)]
        no_cache: bool,

        /// HEAD-probe every track link
        #[arg(long)]
        validate_links: bool,

        /// Parse and normalize duration strings
        #[arg(long)]
        metadata: bool,

        /// Enrich every track with catalog attributes (BPM, key, genre)
        #[arg(long)]
        enrich: bool,

        /// Per-attempt timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout: u64,

        /// Retry attempts per strategy
        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up enriched metadata for one track
    Search {
        /// Track title
        title: String,

        /// Track artist
        artist: String,

        /// Use the catalog-scrape provider (BPM/key/genre) instead of
        /// the lightweight lookup
        #[arg(long)]
        enrich: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show cache tier sizes and hit/miss counters
    Stats,
    /// Drop every cached entry
    Clear,
}

/// Execute the parsed command.
pub fn run_command(args: &Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let config = crate::config::load();

    match &args.command {
        Commands::Scrape {
            url,
            method,
            no_cache,
            validate_links,
            metadata,
            enrich,
            timeout,
            retries,
            json,
        } => scrape::cmd_scrape(
            &rt,
            &config,
            url,
            scrape::ScrapeArgs {
                method: *method,
                no_cache: *no_cache,
                validate_links: *validate_links,
                metadata: *metadata,
                enrich: *enrich,
                timeout_ms: *timeout,
                retries: *retries,
                json: *json,
            },
        ),
        Commands::Search {
            title,
            artist,
            enrich,
            json,
        } => search::cmd_search(&rt, &config, title, artist, *enrich, *json),
        Commands::Cache { action } => cache::cmd_cache(&config, action),
    }
}
