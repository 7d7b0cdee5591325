//! Convergence engine
//!
//! The SyncEngine is responsible for:
//! - Fetching a health snapshot of the fleet every cycle
//! - Resolving each configured domain to its provider zone
//! - Diffing desired against published records for every managed name
//! - Executing the creates and deletes, one failure never blocking the rest
//! - Reporting changes to the notifier and the event channel
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ HealthSource │─── snapshot ───┐
//! └──────────────┘                │
//!                                 ▼
//!                        ┌──────────────┐        ┌──────────────┐
//!                        │  SyncEngine  │◀──────▶│ ZoneResolver │
//!                        └──────────────┘        └──────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//! ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//! │ reconcile::  │        │ DnsProvider  │        │   Notifier   │
//! │ diff (pure)  │        │ list/create/ │        │   + Events   │
//! └──────────────┘        │ delete       │        └──────────────┘
//!                         └──────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Fetch the health snapshot; on failure abort the cycle without touching DNS
//! 2. Keep the healthy addresses that appear in at least one zone
//! 3. For every domain: resolve the zone (skip the domain on failure), then for
//!    every managed name list records, diff, and apply the actions
//! 4. Sleep for the check interval; shutdown is observed only here

use crate::config::{self, SyncConfig, ZoneConfig};
use crate::error::{Error, Result};
use crate::reconcile::{self, DiffResult};
use crate::traits::{
    ChangeAction, ChangeNotifier, DnsChange, DnsError, DnsProvider, DnsRecord, ErrorAction,
    HealthSource, NewRecord, NodeHealth,
};
use crate::zone::ZoneResolver;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for queued notifications at shutdown
const NOTIFIER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        zones_count: usize,
    },

    /// A convergence cycle started
    CycleStarted,

    /// The health snapshot could not be fetched; the cycle was aborted
    HealthUnavailable {
        error: String,
    },

    /// A domain or managed name was skipped for this cycle
    ZoneSkipped {
        name: String,
        error: String,
    },

    /// A record was created
    RecordAdded {
        fqdn: String,
        ip: IpAddr,
    },

    /// A record was deleted
    RecordRemoved {
        fqdn: String,
        ip: IpAddr,
    },

    /// A create or delete failed
    ActionFailed {
        fqdn: String,
        ip: IpAddr,
        action: ErrorAction,
        error: String,
    },

    /// A managed name needed no changes
    ZoneInSync {
        fqdn: String,
        online: usize,
        configured: usize,
    },

    /// A convergence cycle finished
    CycleCompleted {
        added: usize,
        removed: usize,
        failed: usize,
    },

    /// A cycle ended with an error or panic
    CycleFailed {
        error: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Summary of one convergence cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// When the cycle finished
    pub finished_at: DateTime<Utc>,
    /// Managed names that were listed and diffed
    pub zones_synced: usize,
    /// Managed names skipped because of resolution or listing errors
    pub zones_skipped: usize,
    /// Records created
    pub added: usize,
    /// Records deleted
    pub removed: usize,
    /// Deletes of records that were already gone
    pub already_gone: usize,
    /// Failed creates and deletes
    pub failed: usize,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            zones_synced: 0,
            zones_skipped: 0,
            added: 0,
            removed: 0,
            already_gone: 0,
            failed: 0,
        }
    }

    /// Whether anything went wrong during the cycle
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.zones_skipped > 0
    }

    fn absorb(&mut self, outcomes: &[ActionOutcome]) {
        for outcome in outcomes {
            match outcome {
                ActionOutcome::Added => self.added += 1,
                ActionOutcome::Removed => self.removed += 1,
                ActionOutcome::AlreadyGone => self.already_gone += 1,
                ActionOutcome::Failed(_) => self.failed += 1,
            }
        }
    }
}

/// Result of one provider action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionOutcome {
    Added,
    Removed,
    AlreadyGone,
    Failed(ErrorAction),
}

/// One provider action planned from a diff
#[derive(Debug, Clone)]
enum Action {
    Create,
    Remove(DnsRecord),
}

/// Core convergence engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`] or [`SyncEngine::run_with_shutdown()`]
/// 3. Engine runs cycles until a shutdown signal is received
///
/// ## Concurrency
///
/// One task drives the loop and cycles never overlap. Inside a cycle the
/// actions of one managed name are grouped per IP: groups run concurrently,
/// actions within a group run one after another.
pub struct SyncEngine {
    /// Fleet health source
    health_source: Box<dyn HealthSource>,

    /// DNS provider for listing and mutating records
    provider: Arc<dyn DnsProvider>,

    /// Domain -> zone ID cache
    resolver: ZoneResolver,

    /// Change observer
    notifier: Box<dyn ChangeNotifier>,

    /// Managed names grouped by domain, in config order
    domains: Vec<(String, Vec<ZoneConfig>)>,

    /// Union of all configured IPs
    configured_ips: BTreeSet<IpAddr>,

    /// Delay between cycles
    check_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `health_source`: Health source implementation
    /// - `provider`: DNS provider implementation
    /// - `notifier`: Change notifier (use `NoopNotifier` when disabled)
    /// - `config`: Validated before use
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        health_source: Box<dyn HealthSource>,
        provider: Box<dyn DnsProvider>,
        notifier: Box<dyn ChangeNotifier>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let zones = config.zones()?;
        let configured_ips = config::configured_ips(&zones);
        let domains = group_by_domain(zones);

        let provider: Arc<dyn DnsProvider> = Arc::from(provider);
        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            health_source,
            resolver: ZoneResolver::new(Arc::clone(&provider)),
            provider,
            notifier,
            domains,
            configured_ips,
            check_interval: Duration::from_secs(config.engine.check_interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Override the check interval (sub-second intervals are useful in tests)
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// The zone resolver owned by this engine
    pub fn resolver(&self) -> &ZoneResolver {
        &self.resolver
    }

    /// Number of managed names
    pub fn zones_count(&self) -> usize {
        self.domains.iter().map(|(_, zones)| zones.len()).sum()
    }

    /// Run the engine until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until the given shutdown signal fires
    ///
    /// The signal is observed between cycles, so a cycle in flight always
    /// completes. Dropping the sender also counts as a shutdown request.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            zones_count: self.zones_count(),
        });
        info!(
            "Starting sync loop with {:?} interval ({} managed names)",
            self.check_interval,
            self.zones_count()
        );

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        self.log_zones().await;

        loop {
            self.run_cycle_guarded().await;

            debug!("Waiting {:?} until next check", self.check_interval);
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.flush_notifier().await;
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }

                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        info!("Sync loop stopped");
        Ok(())
    }

    /// Give the notifier a bounded chance to deliver what the last cycle queued
    async fn flush_notifier(&self) {
        if tokio::time::timeout(NOTIFIER_FLUSH_TIMEOUT, self.notifier.flush())
            .await
            .is_err()
        {
            warn!(
                "Notifier did not flush within {:?}, pending notifications are dropped",
                NOTIFIER_FLUSH_TIMEOUT
            );
        }
    }

    /// Run one cycle, containing every error and panic it produces
    async fn run_cycle_guarded(&self) -> Option<CycleReport> {
        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                error!("Sync cycle aborted: {}", e);
                info!("Retrying in {:?}", self.check_interval);
                self.emit_event(EngineEvent::CycleFailed {
                    error: e.to_string(),
                });
                None
            }
            Err(panic) => {
                let e = Error::unexpected(panic_message(panic.as_ref()));
                error!("Error in sync loop: {}", e);
                info!("Retrying in {:?}", self.check_interval);
                self.emit_event(EngineEvent::CycleFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Run a single convergence cycle
    ///
    /// # Returns
    ///
    /// - `Ok(CycleReport)`: The cycle ran; per-zone and per-action failures are counted in the report
    /// - `Err(Error::SourceUnavailable)`: No health snapshot; DNS was not touched
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::new(Utc::now());
        info!("Starting health check cycle");
        self.emit_event(EngineEvent::CycleStarted);

        let nodes = match self.health_source.snapshot().await {
            Ok(nodes) => nodes,
            Err(e) => {
                let e = match e {
                    Error::SourceUnavailable(_) => e,
                    other => Error::source_unavailable(other.to_string()),
                };
                warn!(
                    "Health source {} unavailable, skipping DNS changes: {}",
                    self.health_source.source_name(),
                    e
                );
                self.emit_event(EngineEvent::HealthUnavailable {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let healthy = self.healthy_addresses(&nodes);

        for (domain, zones) in &self.domains {
            let zone_id = match self.resolver.resolve(domain).await {
                Ok(zone_id) => zone_id,
                Err(e) => {
                    warn!("Could not find zone ID for domain {}, skipping: {}", domain, e);
                    self.emit_event(EngineEvent::ZoneSkipped {
                        name: domain.clone(),
                        error: e.to_string(),
                    });
                    report.zones_skipped += zones.len();
                    continue;
                }
            };

            for zone in zones {
                match self.sync_zone(zone, &zone_id, &healthy).await {
                    Ok(outcomes) => {
                        report.zones_synced += 1;
                        report.absorb(&outcomes);
                    }
                    Err(e) => {
                        let fqdn = zone.fqdn();
                        warn!("{}: failed to list records, skipping: {}", fqdn, e);
                        self.emit_event(EngineEvent::ZoneSkipped {
                            name: fqdn,
                            error: e.to_string(),
                        });
                        report.zones_skipped += 1;
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            "Health check cycle completed: {} added, {} removed, {} failed",
            report.added, report.removed, report.failed
        );
        self.emit_event(EngineEvent::CycleCompleted {
            added: report.added,
            removed: report.removed,
            failed: report.failed,
        });

        Ok(report)
    }

    /// Log every managed name with its configured and published IPs
    ///
    /// Read-only: resolves zones and lists records, never mutates.
    pub async fn log_zones(&self) {
        info!("Initializing zones");

        for (domain, zones) in &self.domains {
            let zone_id = match self.resolver.resolve(domain).await {
                Ok(zone_id) => zone_id,
                Err(e) => {
                    warn!("Could not find zone ID for domain {}: {}", domain, e);
                    continue;
                }
            };

            info!("Domain: {}, Zone ID: {}", domain, zone_id);

            for zone in zones {
                let fqdn = zone.fqdn();
                info!("  Zone: {}, TTL: {}, Proxied: {}", fqdn, zone.ttl, zone.proxied);
                info!("  Configured IPs: {}", format_weights(&zone.desired));

                match self.provider.list_records(&zone_id, &fqdn).await {
                    Ok(records) if records.is_empty() => info!("  Existing DNS records: None"),
                    Ok(records) => {
                        let ips: Vec<String> = records.iter().map(|r| r.ip.to_string()).collect();
                        info!("  Existing DNS records: {}", ips.join(", "));
                    }
                    Err(e) => warn!("  Could not list existing DNS records: {}", e),
                }
            }
        }

        info!("Initialization complete");
    }

    /// Healthy addresses restricted to configured IPs, with a summary log
    fn healthy_addresses(&self, nodes: &[NodeHealth]) -> HashSet<IpAddr> {
        let configured: Vec<(&NodeHealth, IpAddr)> = nodes
            .iter()
            .filter_map(|node| node.ip().map(|ip| (node, ip)))
            .filter(|(_, ip)| self.configured_ips.contains(ip))
            .collect();

        let (healthy_nodes, unhealthy_nodes): (Vec<_>, Vec<_>) =
            configured.iter().partition(|(node, _)| node.healthy);

        info!(
            "Configured nodes: {}, Healthy: {}, Unhealthy: {}",
            configured.len(),
            healthy_nodes.len(),
            unhealthy_nodes.len()
        );

        if !healthy_nodes.is_empty() {
            let addrs: Vec<String> = healthy_nodes.iter().map(|(_, ip)| ip.to_string()).collect();
            info!("Healthy nodes: {}", addrs.join(", "));
        }

        if !unhealthy_nodes.is_empty() {
            let details: Vec<String> = unhealthy_nodes
                .iter()
                .map(|(node, ip)| format!("{} ({})", ip, node.unhealthy_reasons().join(", ")))
                .collect();
            info!("Unhealthy nodes: {}", details.join("; "));
        }

        healthy_nodes.iter().map(|(_, ip)| *ip).collect()
    }

    /// Converge one managed name
    ///
    /// Only the listing can fail; action failures are returned as outcomes.
    async fn sync_zone(
        &self,
        zone: &ZoneConfig,
        zone_id: &str,
        healthy: &HashSet<IpAddr>,
    ) -> Result<Vec<ActionOutcome>> {
        let fqdn = zone.fqdn();
        debug!("Syncing zone: {}", fqdn);

        let existing = self.provider.list_records(zone_id, &fqdn).await?;
        let result = reconcile::diff(&zone.desired, healthy, &existing);

        if result.is_empty() {
            self.log_zone_status(&fqdn, &result);
            self.emit_event(EngineEvent::ZoneInSync {
                fqdn,
                online: result.online,
                configured: result.configured,
            });
            return Ok(Vec::new());
        }

        let groups = plan_actions(&result);
        let outcomes: Vec<ActionOutcome> = futures::future::join_all(
            groups
                .into_iter()
                .map(|(ip, actions)| self.apply_group(zone, zone_id, ip, actions)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        Ok(outcomes)
    }

    fn log_zone_status(&self, fqdn: &str, result: &DiffResult) {
        if result.is_unconfigured() {
            info!("{}: no IPs configured", fqdn);
            return;
        }

        let status = format!("{}/{} online", result.online, result.configured);
        if result.unhealthy.is_empty() {
            info!("{}: {}", fqdn, status);
        } else {
            let unhealthy: Vec<String> = result.unhealthy.iter().map(|ip| ip.to_string()).collect();
            info!("{}: {}, unhealthy: {}", fqdn, status, unhealthy.join(", "));
        }
    }

    /// Apply the actions for one IP sequentially
    async fn apply_group(
        &self,
        zone: &ZoneConfig,
        zone_id: &str,
        ip: IpAddr,
        actions: Vec<Action>,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let outcome = match action {
                Action::Create => self.add_record(zone, zone_id, ip).await,
                Action::Remove(record) => self.remove_record(zone, zone_id, &record).await,
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn add_record(&self, zone: &ZoneConfig, zone_id: &str, ip: IpAddr) -> ActionOutcome {
        let fqdn = zone.fqdn();
        let record = NewRecord {
            name: fqdn.clone(),
            ip,
            ttl: zone.ttl,
            proxied: zone.proxied,
        };

        match self.provider.create_record(zone_id, &record).await {
            Ok(created) => {
                info!("{}: added {}", fqdn, ip);
                debug!("{}: new record ID {}", fqdn, created.id);
                self.emit_event(EngineEvent::RecordAdded { fqdn, ip });
                self.notifier.notify_change(DnsChange {
                    domain: zone.domain.clone(),
                    subdomain: zone.subdomain.clone(),
                    ip,
                    action: ChangeAction::Added,
                });
                ActionOutcome::Added
            }
            Err(e) => self.action_failed(zone, fqdn, ip, ErrorAction::Add, e),
        }
    }

    async fn remove_record(
        &self,
        zone: &ZoneConfig,
        zone_id: &str,
        record: &DnsRecord,
    ) -> ActionOutcome {
        let fqdn = zone.fqdn();
        let ip = record.ip;

        match self.provider.delete_record(zone_id, &record.id).await {
            Ok(()) => {
                info!("{}: removed {}", fqdn, ip);
                self.emit_event(EngineEvent::RecordRemoved { fqdn, ip });
                self.notifier.notify_change(DnsChange {
                    domain: zone.domain.clone(),
                    subdomain: zone.subdomain.clone(),
                    ip,
                    action: ChangeAction::Removed,
                });
                ActionOutcome::Removed
            }
            Err(e) if e.is_not_found() => {
                warn!("{}: record {} for {} was already deleted", fqdn, record.id, ip);
                ActionOutcome::AlreadyGone
            }
            Err(e) => self.action_failed(zone, fqdn, ip, ErrorAction::Remove, e),
        }
    }

    fn action_failed(
        &self,
        zone: &ZoneConfig,
        fqdn: String,
        ip: IpAddr,
        action: ErrorAction,
        e: Error,
    ) -> ActionOutcome {
        error!("{}: failed to {} {}: {}", fqdn, action, ip, e);
        self.emit_event(EngineEvent::ActionFailed {
            fqdn,
            ip,
            action,
            error: e.to_string(),
        });
        self.notifier.notify_error(DnsError {
            domain: zone.domain.clone(),
            subdomain: zone.subdomain.clone(),
            ip,
            action,
            error_message: e.to_string(),
        });
        ActionOutcome::Failed(action)
    }

    /// Emit an engine event
    ///
    /// A full channel drops the event with a warning; a closed channel
    /// (nobody listening) is ignored.
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Group zones by domain, keeping the order in which domains first appear
fn group_by_domain(zones: Vec<ZoneConfig>) -> Vec<(String, Vec<ZoneConfig>)> {
    let mut domains: Vec<(String, Vec<ZoneConfig>)> = Vec::new();
    for zone in zones {
        match domains.iter_mut().find(|(domain, _)| *domain == zone.domain) {
            Some((_, group)) => group.push(zone),
            None => domains.push((zone.domain.clone(), vec![zone])),
        }
    }
    domains
}

/// Turn a diff into per-IP action groups
fn plan_actions(result: &DiffResult) -> BTreeMap<IpAddr, Vec<Action>> {
    let mut groups: BTreeMap<IpAddr, Vec<Action>> = BTreeMap::new();
    for record in &result.to_remove {
        groups
            .entry(record.ip)
            .or_default()
            .push(Action::Remove(record.clone()));
    }
    for ip in &result.to_create {
        groups.entry(*ip).or_default().push(Action::Create);
    }
    groups
}

fn format_weights(desired: &BTreeMap<IpAddr, u32>) -> String {
    if desired.is_empty() {
        return "None".to_string();
    }
    desired
        .iter()
        .map(|(ip, weight)| match weight {
            1 => ip.to_string(),
            n => format!("{} (x{})", ip, n),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in sync cycle".to_string()
    }
}
