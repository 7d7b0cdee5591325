//! Domain to zone-ID resolution
//!
//! Successful lookups are cached for the lifetime of the process. Failures
//! are never cached, so a provider outage heals on the next cycle. A cached
//! zone ID is never invalidated; moving a zone out of band requires a restart.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::DnsProvider;

/// Resolves domains to provider zone IDs with a positive-only cache
pub struct ZoneResolver {
    provider: Arc<dyn DnsProvider>,
    cache: RwLock<HashMap<String, String>>,
}

impl ZoneResolver {
    /// Create a resolver backed by the given provider
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a domain to its zone ID
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The zone ID (from cache or a fresh lookup)
    /// - `Err(Error::ZoneResolution)`: The lookup failed; nothing was cached
    pub async fn resolve(&self, domain: &str) -> Result<String> {
        if let Some(zone_id) = self.cache.read().await.get(domain) {
            debug!("Zone ID for {} served from cache", domain);
            return Ok(zone_id.clone());
        }

        let zone_id = self
            .provider
            .find_zone_id(domain)
            .await
            .map_err(|e| Error::zone_resolution(domain, e.to_string()))?;

        // First write wins if two lookups for the same domain raced
        let mut cache = self.cache.write().await;
        let cached = cache
            .entry(domain.to_string())
            .or_insert_with(|| zone_id.clone())
            .clone();
        info!("Resolved zone ID for {}: {}", domain, cached);

        Ok(cached)
    }

    /// Cached zone ID for a domain, without a lookup
    pub async fn cached(&self, domain: &str) -> Option<String> {
        self.cache.read().await.get(domain).cloned()
    }

    /// Number of cached domains
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

impl std::fmt::Debug for ZoneResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneResolver")
            .field("provider", &self.provider.provider_name())
            .finish_non_exhaustive()
    }
}
