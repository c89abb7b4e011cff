//! Cache maintenance commands.

use super::CacheAction;
use crate::config::Config;
use crate::scraper::Scraper;

/// Show or clear the scrape/metadata cache.
pub fn cmd_cache(config: &Config, action: &CacheAction) -> anyhow::Result<()> {
    let scraper = Scraper::new(config);

    match action {
        CacheAction::Stats => {
            let stats = scraper.cache_stats();
            println!("Cache statistics:");
            println!("  Memory entries: {}", stats.memory_entries);
            println!("  Disk entries:   {}", stats.disk_entries);
            println!(
                "  Hits: {} (memory {}, disk {})",
                stats.hits, stats.memory_hits, stats.disk_hits
            );
            println!("  Misses: {}", stats.misses);
        }
        CacheAction::Clear => {
            scraper.clear_cache()?;
            println!("✓ Cache cleared.");
        }
    }
    Ok(())
}
