// # Health Source Trait
//
// Defines the interface for reading the current health of the proxy fleet.
//
// ## Implementations
//
// - Remnawave control plane: `fleetdns-health-remnawave` crate
//
// ## Usage
//
// ```rust,ignore
// use fleetdns_core::HealthSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* HealthSource implementation */;
//
//     for node in source.snapshot().await? {
//         println!("{} healthy={}", node.address, node.healthy);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Diagnostic fields reported alongside a node's health verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDiagnostics {
    /// Control-plane identifier of the node
    pub uuid: Option<String>,
    /// Whether the node agent is connected to the control plane
    pub connected: bool,
    /// Whether an operator disabled the node
    pub disabled: bool,
    /// Version of the proxy agent running on the node, if any
    pub agent_version: Option<String>,
    /// Agent uptime as reported by the control plane
    pub uptime: Option<String>,
    /// Proxy port
    pub port: Option<u16>,
    /// Number of users currently online
    pub users_online: u64,
}

/// Health of one node in a snapshot
///
/// Produced fresh on every [`HealthSource::snapshot`] call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    /// Human-readable node name
    pub name: String,
    /// Node address as reported by the control plane
    pub address: String,
    /// Health verdict computed by the source
    pub healthy: bool,
    /// Diagnostic fields
    pub diagnostics: NodeDiagnostics,
}

impl NodeHealth {
    /// Create a node record with default diagnostics
    pub fn new(name: impl Into<String>, address: impl Into<String>, healthy: bool) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            healthy,
            diagnostics: NodeDiagnostics::default(),
        }
    }

    /// Attach diagnostics
    pub fn with_diagnostics(mut self, diagnostics: NodeDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The node address parsed as an IP, if it is one
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.trim().parse().ok()
    }

    /// Human-readable reasons for an unhealthy verdict
    pub fn unhealthy_reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if !self.diagnostics.connected {
            reasons.push("disconnected");
        }
        if self.diagnostics.disabled {
            reasons.push("disabled");
        }
        if self
            .diagnostics
            .agent_version
            .as_deref()
            .is_none_or(str::is_empty)
        {
            reasons.push("no agent");
        }
        reasons
    }
}

/// Trait for health source implementations
///
/// A health source computes the health of every node; the engine never
/// second-guesses the verdict.
///
/// # Failure semantics
///
/// When the control plane cannot be reached the source must return
/// [`crate::Error::SourceUnavailable`]. Returning an empty or partial snapshot
/// instead would be read as "every node is unhealthy" and purge all records.
///
/// # Timeouts
///
/// Implementations own the timeout of their transport; the engine does not
/// wrap calls in its own deadline.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Fetch the current health of every node in the fleet
    async fn snapshot(&self) -> Result<Vec<NodeHealth>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing health sources from configuration
pub trait HealthSourceFactory: Send + Sync {
    /// Create a HealthSource instance from configuration
    fn create(
        &self,
        config: &crate::config::HealthSourceConfig,
    ) -> Result<Box<dyn HealthSource>, crate::Error>;
}
