//! Trait definitions for metadata providers.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real provider implementations, while tests
//! substitute scripted mocks into the aggregator.

use async_trait::async_trait;

use super::domain::{MetadataError, ProviderHit};

/// Common contract every metadata source implements.
///
/// `search` returning `Ok(None)` means "nothing confident found" — a
/// normal outcome, distinct from an operational failure.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Stable provider name, recorded in `EnhancedMetadata::sources`.
    fn name(&self) -> &'static str;

    /// Whether the provider has the configuration it needs to run.
    fn is_configured(&self) -> bool;

    /// Search for one track and return a partial metadata hit.
    async fn search(&self, title: &str, artist: &str)
        -> Result<Option<ProviderHit>, MetadataError>;
}

/// Scriptable providers for aggregator tests.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::metadata::domain::EnhancedMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockProvider {
        pub provider_name: &'static str,
        pub configured: bool,
        pub hit: Option<ProviderHit>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl MockProvider {
        /// A provider returning one fixed hit.
        pub fn with_hit(name: &'static str, confidence: f32, metadata: EnhancedMetadata) -> Self {
            Self {
                provider_name: name,
                configured: true,
                hit: Some(ProviderHit {
                    metadata,
                    confidence,
                }),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        /// A provider that finds nothing.
        pub fn empty(name: &'static str) -> Self {
            Self {
                provider_name: name,
                configured: true,
                hit: None,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        /// A provider that errors on every search.
        pub fn failing(name: &'static str) -> Self {
            Self {
                provider_name: name,
                configured: true,
                hit: None,
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        /// A provider with missing configuration.
        pub fn unconfigured(name: &'static str) -> Self {
            Self {
                provider_name: name,
                configured: false,
                hit: None,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for MockProvider {
        fn name(&self) -> &'static str {
            self.provider_name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn search(
            &self,
            _title: &str,
            _artist: &str,
        ) -> Result<Option<ProviderHit>, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetadataError::Network("mock failure".to_string()));
            }
            Ok(self.hit.clone())
        }
    }
}
