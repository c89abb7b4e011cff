//! Metadata enrichment - looks up authoritative track attributes.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal types that represent our data
//! - **Provider contract** (`traits.rs`) - `MetadataProvider` + test mocks
//! - **Providers** (`catalog.rs`, `fallback.rs`) - the catalog-scrape
//!   pipeline and the lightweight structured lookup
//! - **Aggregator** (`aggregator.rs`) - provider sequencing and
//!   confidence-based merging
//!
//! This decoupling means:
//! 1. Site/API changes stay inside one provider file
//! 2. The aggregator is tested entirely against mocks
//! 3. Adding a provider never touches the merge logic
//!
//! # Usage
//!
//! ```ignore
//! use cratedigger::metadata::{MetadataAggregator, CatalogProvider, FallbackProvider};
//!
//! let aggregator = MetadataAggregator::new(catalog, fallback);
//! let meta = aggregator.search_metadata("Strobe", "deadmau5", true).await;
//! println!("BPM: {:?}, Key: {:?}", meta.bpm, meta.key);
//! ```

pub mod aggregator;
pub mod catalog;
pub mod domain;
pub mod fallback;
pub mod traits;

pub use aggregator::MetadataAggregator;
pub use catalog::CatalogProvider;
pub use domain::{EnhancedMetadata, MetadataError, ProviderHit};
pub use fallback::FallbackProvider;
pub use traits::MetadataProvider;
