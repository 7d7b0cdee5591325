// # DNS Provider Trait
//
// Defines the interface for reading and mutating A records in a provider zone.
//
// ## Implementations
//
// - Cloudflare: `fleetdns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use fleetdns_core::DnsProvider;
// use fleetdns_core::traits::NewRecord;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone_id = provider.find_zone_id("example.com").await?;
//     let records = provider.list_records(&zone_id, "vpn.example.com").await?;
//
//     provider.create_record(&zone_id, &NewRecord {
//         name: "vpn.example.com".into(),
//         ip: std::net::IpAddr::from([10, 0, 0, 1]),
//         ttl: 120,
//         proxied: false,
//     }).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// An A record as held by the provider
///
/// Owned by the provider. The engine re-lists records every cycle and never
/// caches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// The record ID (provider-specific, opaque)
    pub id: String,
    /// Fully qualified record name
    pub name: String,
    /// Published address
    pub ip: IpAddr,
    /// Time-to-live for the record
    pub ttl: u32,
    /// Whether traffic is proxied by the provider
    pub proxied: bool,
}

/// Parameters of a record to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Fully qualified record name
    pub name: String,
    /// Address to publish
    pub ip: IpAddr,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Whether traffic is proxied by the provider
    pub proxied: bool,
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// Providers execute exactly the API call they are asked for:
///
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Bound every call with a timeout
/// - ❌ Retry or back off (the next convergence cycle is the retry)
/// - ❌ Cache zones or records (zone IDs are cached by `ZoneResolver`)
/// - ❌ Decide which records should exist (owned by the reconciliation diff)
///
/// # Idempotency
///
/// `create_record` is **not** idempotent at the provider: a blind retry can
/// create a duplicate. The engine tolerates this because the next cycle's
/// listing trims any excess.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Resolve a domain to the provider's zone identifier
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The zone ID
    /// - `Err(Error::NotFound)`: No zone exists for the domain
    /// - `Err(Error)`: The lookup failed
    async fn find_zone_id(&self, domain: &str) -> Result<String, crate::Error>;

    /// List the A records named `name` in a zone, in provider order
    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create one A record
    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<DnsRecord, crate::Error>;

    /// Delete one record by ID
    ///
    /// Deleting a record that no longer exists should fail with
    /// `Error::NotFound` so the caller can classify it as already gone.
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
