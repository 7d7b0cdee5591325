// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare DNS provider implementation for fleetdns.
//
// ## Behaviour
//
// - ✅ One HTTP request per trait call (plus pagination while listing)
// - ✅ Full error propagation to the engine
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry logic (the next convergence cycle is the retry)
// - ❌ NO caching (zone IDs are cached by `ZoneResolver`, records never)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A&name=...&per_page=100&page=N`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use fleetdns_core::config::ProviderConfig;
use fleetdns_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, NewRecord};
use fleetdns_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

/// Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

impl Record {
    fn into_dns_record(self) -> Option<DnsRecord> {
        match self.content.parse::<IpAddr>() {
            Ok(ip) => Some(DnsRecord {
                id: self.id,
                name: self.name,
                ip,
                ttl: self.ttl,
                proxied: self.proxied,
            }),
            Err(_) => {
                tracing::warn!(
                    "Ignoring record {} ({}): content {:?} is not an IP address",
                    self.id,
                    self.name,
                    self.content
                );
                None
            }
        }
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST/DELETE
/// - **NOT** actually modify DNS records
///
/// Created records are synthetic and never show up in later listings, so a
/// dry-run daemon reports the same additions every cycle.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL (overridable for tests)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `dry_run`: If true, perform GET requests but skip mutations
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: If the token is empty
    /// - `Err(Error::Http)`: If the HTTP client cannot be built
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether mutations are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the Cloudflare envelope
    ///
    /// `context` names the operation in error messages.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &error_text, context));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} failed: {}", context, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{}: {}", context, status)),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        )),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", context, status, body),
        ),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn find_zone_id(&self, domain: &str) -> Result<String> {
        tracing::debug!("Looking up zone ID for domain: {}", domain);

        let request = self.client.get(self.url("/zones")).query(&[("name", domain)]);
        let envelope: Envelope<Vec<Zone>> = self.send(request, "Zone lookup").await?;

        let zone = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("No zone found for domain: {}", domain)))?;

        tracing::debug!("Found zone ID for {}: {}", domain, zone.id);
        Ok(zone.id)
    }

    async fn list_records(&self, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>> {
        let path = format!("/zones/{}/dns_records", zone_id);
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let page_param = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let request = self.client.get(self.url(&path)).query(&[
                ("type", "A"),
                ("name", name),
                ("per_page", per_page.as_str()),
                ("page", page_param.as_str()),
            ]);
            let envelope: Envelope<Vec<Record>> = self.send(request, "Record listing").await?;

            let total_pages = envelope.result_info.map(|info| info.total_pages).unwrap_or(1);
            records.extend(
                envelope
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(Record::into_dns_record),
            );

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Found {} DNS records for {} in zone {}", records.len(), name, zone_id);
        Ok(records)
    }

    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "vpn.example.com", "content": "1.2.3.4", "ttl": 120, "proxied": false}
    /// ```
    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<DnsRecord> {
        let payload = serde_json::json!({
            "type": "A",
            "name": record.name,
            "content": record.ip.to_string(),
            "ttl": record.ttl,
            "proxied": record.proxied,
        });

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST to /zones/{}/dns_records with payload: {}",
                zone_id,
                payload
            );
            return Ok(DnsRecord {
                id: format!("dry-run-{}", record.ip),
                name: record.name.clone(),
                ip: record.ip,
                ttl: record.ttl,
                proxied: record.proxied,
            });
        }

        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .json(&payload);
        let envelope: Envelope<Record> = self.send(request, "Record creation").await?;

        let created = envelope
            .result
            .and_then(Record::into_dns_record)
            .ok_or_else(|| {
                Error::provider("cloudflare", "Invalid response format: missing created record")
            })?;

        tracing::debug!("Created DNS record: {} -> {} ({})", created.name, created.ip, created.id);
        Ok(created)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE to {}", path);
            return Ok(());
        }

        let request = self.client.delete(self.url(&path));
        let _: Envelope<serde_json::Value> = self.send(request, "Record deletion").await?;

        tracing::debug!("Deleted DNS record: {}", record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
///
/// Dry-run is enabled by the config flag or by `FLEETDNS_MODE=dry-run`.
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare { api_token, dry_run } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token is required"));
                }

                let dry_run = *dry_run
                    || std::env::var("FLEETDNS_MODE")
                        .unwrap_or_default()
                        .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareProvider::new(api_token.clone(), dry_run)?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use fleetdns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// fleetdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &fleetdns_core::ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
