//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors ([`ScrapeError`], [`MetadataError`],
//!   [`CacheError`]) for detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! Note the asymmetry required by the engine contract: only
//! `ScrapeError::InvalidInput` ever crosses the orchestrator boundary as
//! an `Err`. Every other scrape failure is folded into a degraded
//! `ScrapingResult`, and cache failures never propagate at all.

pub use crate::cache::CacheError;
pub use crate::metadata::domain::MetadataError;
pub use crate::scraper::ScrapeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scraping error
    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// Metadata provider/aggregation error
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Cache error (non-fatal in the engine; surfaced only by CLI tools)
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ScrapeError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Scrape(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("missing credentials");
        assert!(err.to_string().contains("missing credentials"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::Scrape(ScrapeError::ExtractionEmpty)
            .context("while scraping tracklist page");
        let msg = err.to_string();
        assert!(msg.contains("while scraping tracklist page"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::config("test"));
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx.unwrap_err().to_string().contains("additional context"));
    }
}
