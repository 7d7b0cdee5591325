// # Remnawave Health Source
//
// This crate provides a health source backed by the Remnawave control plane.
//
// ## Architecture
//
// Every snapshot is one `GET {api_url}/api/nodes` request. Nothing is cached
// and nothing runs in the background; the engine decides when to ask.
//
// ## Health Rule
//
// A node is healthy when all of the following hold:
//
// - the control plane reports it connected
// - it is not disabled
// - it reports a non-empty Xray version (the proxy agent is running)
//
// ## Failure Semantics
//
// Transport errors, non-success statuses and undecodable bodies all become
// `Error::SourceUnavailable`. The source never turns a failure into an empty
// snapshot, since the engine would read that as "every node is down".

use fleetdns_core::ProviderRegistry;
use fleetdns_core::config::HealthSourceConfig;
use fleetdns_core::traits::{HealthSource, HealthSourceFactory, NodeDiagnostics, NodeHealth};
use fleetdns_core::{Error, Result};

use serde::Deserialize;
use std::time::Duration;

/// Default HTTP timeout for control-plane requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body of `GET /api/nodes`
#[derive(Debug, Deserialize)]
struct NodesResponse {
    response: Vec<RemnawaveNode>,
}

/// A node as reported by the control plane
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemnawaveNode {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    is_connected: bool,
    #[serde(default)]
    is_disabled: bool,
    #[serde(default)]
    xray_version: Option<String>,
    #[serde(default)]
    xray_uptime: Option<serde_json::Value>,
    #[serde(default)]
    users_online: Option<u64>,
}

impl RemnawaveNode {
    fn is_healthy(&self) -> bool {
        self.is_connected
            && !self.is_disabled
            && self
                .xray_version
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty())
    }

    fn into_node_health(self) -> NodeHealth {
        let healthy = self.is_healthy();
        let uptime = self.xray_uptime.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        NodeHealth::new(self.name, self.address, healthy).with_diagnostics(NodeDiagnostics {
            uuid: self.uuid,
            connected: self.is_connected,
            disabled: self.is_disabled,
            agent_version: self.xray_version,
            uptime,
            port: self.port,
            users_online: self.users_online.unwrap_or(0),
        })
    }
}

/// Health source reading node status from the Remnawave REST API
pub struct RemnawaveHealthSource {
    /// Panel base URL, without trailing slash
    api_url: String,

    /// API key sent as a bearer token
    /// ⚠️ NEVER log this value
    api_key: String,

    /// HTTP client
    client: reqwest::Client,
}

impl std::fmt::Debug for RemnawaveHealthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemnawaveHealthSource")
            .field("api_url", &self.api_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl RemnawaveHealthSource {
    /// Create a new Remnawave health source
    ///
    /// # Parameters
    ///
    /// - `api_url`: Panel base URL (e.g., "https://panel.example.com")
    /// - `api_key`: API token issued by the panel
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_url, api_key, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create with a custom request timeout
    pub fn with_timeout(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();

        if api_url.is_empty() {
            return Err(Error::config("Remnawave API URL cannot be empty"));
        }
        if api_key.is_empty() {
            return Err(Error::config("Remnawave API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url,
            api_key,
            client,
        })
    }

    /// Fetch the raw node list
    async fn fetch_nodes(&self) -> Result<Vec<RemnawaveNode>> {
        let url = format!("{}/api/nodes", self.api_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::source_unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::source_unavailable(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: NodesResponse = response
            .json()
            .await
            .map_err(|e| Error::source_unavailable(format!("Failed to decode response: {}", e)))?;

        Ok(body.response)
    }
}

#[async_trait::async_trait]
impl HealthSource for RemnawaveHealthSource {
    async fn snapshot(&self) -> Result<Vec<NodeHealth>> {
        let nodes: Vec<NodeHealth> = self
            .fetch_nodes()
            .await?
            .into_iter()
            .map(RemnawaveNode::into_node_health)
            .collect();

        for node in &nodes {
            tracing::debug!(
                "Node {} ({}): {}",
                node.name,
                node.address,
                if node.healthy { "healthy" } else { "unhealthy" }
            );
        }

        let healthy = nodes.iter().filter(|n| n.healthy).count();
        tracing::info!(
            "Checked {} nodes: {} healthy, {} unhealthy",
            nodes.len(),
            healthy,
            nodes.len() - healthy
        );

        Ok(nodes)
    }

    fn source_name(&self) -> &'static str {
        "remnawave"
    }
}

/// Factory for creating Remnawave health sources
pub struct RemnawaveFactory;

impl HealthSourceFactory for RemnawaveFactory {
    fn create(&self, config: &HealthSourceConfig) -> Result<Box<dyn HealthSource>> {
        match config {
            HealthSourceConfig::Remnawave { api_url, api_key } => Ok(Box::new(
                RemnawaveHealthSource::new(api_url.clone(), api_key.clone())?,
            )),
            _ => Err(Error::config("Invalid config for Remnawave health source")),
        }
    }
}

/// Register the Remnawave health source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_health_source("remnawave", Box::new(RemnawaveFactory));
}
