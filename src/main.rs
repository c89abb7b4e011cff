//! Cratedigger - tracklist scraping and metadata enrichment engine.
//!
//! Extracts structured track listings from DJ-set/tracklist pages that
//! expose no official API, and enriches individual tracks with
//! authoritative attributes (BPM, key, genre, label) from a catalog
//! site. Consumers are a download pipeline and a UI that persist and
//! display the typed results.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod metadata;
pub mod model;
pub mod ratelimit;
pub mod scraper;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("cratedigger=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
