//! Command-line interface for cratedigger.
//!
//! This module provides CLI commands for scraping tracklist pages,
//! looking up enriched track metadata, and maintaining the cache.

mod commands;

pub use commands::{Cli, Commands, run_command};
