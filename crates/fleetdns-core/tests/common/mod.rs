//! Test doubles and common utilities for architecture contract tests
//!
//! The doubles keep their state behind `Arc<Mutex<..>>` so a test can hand a
//! clone to the engine and still inspect what happened afterwards.

#![allow(dead_code)]

use fleetdns_core::config::{
    DomainConfig, EngineConfig, HealthSourceConfig, IpWeights, NotifierConfig, ProviderConfig,
    SyncConfig, ZoneEntry,
};
use fleetdns_core::error::{Error, Result};
use fleetdns_core::traits::{
    ChangeNotifier, DnsChange, DnsError, DnsProvider, DnsRecord, HealthSource, NewRecord,
    NodeDiagnostics, NodeHealth,
};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ip(last: u8) -> IpAddr {
    IpAddr::from([10, 0, 0, last])
}

/// A healthy node at 10.0.0.`last`
pub fn healthy_node(last: u8) -> NodeHealth {
    NodeHealth::new(format!("node-{}", last), ip(last).to_string(), true).with_diagnostics(
        NodeDiagnostics {
            connected: true,
            agent_version: Some("1.8.4".to_string()),
            ..Default::default()
        },
    )
}

/// A disconnected node at 10.0.0.`last`
pub fn unhealthy_node(last: u8) -> NodeHealth {
    NodeHealth::new(format!("node-{}", last), ip(last).to_string(), false)
}

/// What the scripted source does on the next snapshot
#[derive(Clone)]
enum Script {
    Nodes(Vec<NodeHealth>),
    Fail,
    Panic,
}

/// A HealthSource whose snapshot the test controls
#[derive(Clone)]
pub struct ScriptedHealthSource {
    script: Arc<Mutex<Script>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedHealthSource {
    pub fn new(nodes: Vec<NodeHealth>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::Nodes(nodes))),
            delay: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the snapshot returned from now on
    pub fn set_nodes(&self, nodes: Vec<NodeHealth>) {
        *self.script.lock().unwrap() = Script::Nodes(nodes);
    }

    /// Make every snapshot fail until `set_nodes` is called
    pub fn fail(&self) {
        *self.script.lock().unwrap() = Script::Fail;
    }

    /// Make every snapshot panic until `set_nodes` is called
    pub fn panic(&self) {
        *self.script.lock().unwrap() = Script::Panic;
    }

    /// Delay every snapshot
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of snapshot() calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HealthSource for ScriptedHealthSource {
    async fn snapshot(&self) -> Result<Vec<NodeHealth>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Nodes(nodes) => Ok(nodes),
            Script::Fail => Err(Error::source_unavailable("connection refused")),
            Script::Panic => panic!("health source exploded"),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct ProviderState {
    zones: HashMap<String, String>,
    failing_zones: HashSet<String>,
    records: Vec<(String, DnsRecord)>,
    next_id: usize,
    failing_creates: HashSet<IpAddr>,
    failing_deletes: HashSet<String>,
    vanished: HashSet<String>,
    failing_lists: HashSet<String>,
    creates: Vec<NewRecord>,
    deletes: Vec<String>,
    list_calls: usize,
    zone_lookups: usize,
}

/// A DnsProvider holding records in memory, with failure injection
#[derive(Clone)]
pub struct InMemoryProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProvider {
    /// A provider that knows the zone `example.com` as `zone-example`
    pub fn new() -> Self {
        let provider = Self {
            state: Arc::new(Mutex::new(ProviderState::default())),
        };
        provider.add_zone("example.com", "zone-example");
        provider
    }

    pub fn add_zone(&self, domain: &str, zone_id: &str) {
        self.state
            .lock()
            .unwrap()
            .zones
            .insert(domain.to_string(), zone_id.to_string());
    }

    /// Insert an existing record; returns its ID
    pub fn seed(&self, zone_id: &str, name: &str, addr: IpAddr) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        state.records.push((
            zone_id.to_string(),
            DnsRecord {
                id: id.clone(),
                name: name.to_string(),
                ip: addr,
                ttl: 120,
                proxied: false,
            },
        ));
        id
    }

    /// Published addresses for a name, sorted
    pub fn ips(&self, name: &str) -> Vec<IpAddr> {
        let state = self.state.lock().unwrap();
        let mut ips: Vec<IpAddr> = state
            .records
            .iter()
            .filter(|(_, r)| r.name == name)
            .map(|(_, r)| r.ip)
            .collect();
        ips.sort();
        ips
    }

    pub fn fail_zone(&self, domain: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_zones
            .insert(domain.to_string());
    }

    pub fn heal_zone(&self, domain: &str) {
        self.state.lock().unwrap().failing_zones.remove(domain);
    }

    pub fn fail_create_for(&self, addr: IpAddr) {
        self.state.lock().unwrap().failing_creates.insert(addr);
    }

    pub fn fail_delete(&self, record_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(record_id.to_string());
    }

    /// The record is still listed but deleting it reports "not found"
    pub fn vanish(&self, record_id: &str) {
        self.state
            .lock()
            .unwrap()
            .vanished
            .insert(record_id.to_string());
    }

    pub fn fail_list(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_lists
            .insert(name.to_string());
    }

    pub fn creates(&self) -> Vec<NewRecord> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    /// Number of create and delete calls, successful or not
    pub fn mutation_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.creates.len() + state.deletes.len()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn zone_lookups(&self) -> usize {
        self.state.lock().unwrap().zone_lookups
    }
}

#[async_trait::async_trait]
impl DnsProvider for InMemoryProvider {
    async fn find_zone_id(&self, domain: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.zone_lookups += 1;
        if state.failing_zones.contains(domain) {
            return Err(Error::provider("memory", "503 Service Unavailable"));
        }
        state
            .zones
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("zone for {}", domain)))
    }

    async fn list_records(&self, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.failing_lists.contains(name) {
            return Err(Error::provider("memory", "listing failed"));
        }
        Ok(state
            .records
            .iter()
            .filter(|(zone, r)| zone == zone_id && r.name == name)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<DnsRecord> {
        let mut state = self.state.lock().unwrap();
        state.creates.push(record.clone());
        if state.failing_creates.contains(&record.ip) {
            return Err(Error::provider("memory", "create rejected"));
        }
        state.next_id += 1;
        let created = DnsRecord {
            id: format!("rec-{}", state.next_id),
            name: record.name.clone(),
            ip: record.ip,
            ttl: record.ttl,
            proxied: record.proxied,
        };
        state.records.push((zone_id.to_string(), created.clone()));
        Ok(created)
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(record_id.to_string());
        if state.failing_deletes.contains(record_id) {
            return Err(Error::provider("memory", "delete rejected"));
        }
        state.records.retain(|(_, r)| r.id != record_id);
        if state.vanished.contains(record_id) {
            return Err(Error::not_found(format!("record {}", record_id)));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// A ChangeNotifier that records everything it is told
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    changes: Arc<Mutex<Vec<DnsChange>>>,
    errors: Arc<Mutex<Vec<DnsError>>>,
    flushes: Arc<Mutex<Vec<usize>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<DnsChange> {
        self.changes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<DnsError> {
        self.errors.lock().unwrap().clone()
    }

    /// Number of changes recorded at each flush
    pub fn flushes(&self) -> Vec<usize> {
        self.flushes.lock().unwrap().clone()
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn notify_change(&self, change: DnsChange) {
        self.changes.lock().unwrap().push(change);
    }

    fn notify_error(&self, error: DnsError) {
        self.errors.lock().unwrap().push(error);
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        let seen = self.changes.lock().unwrap().len();
        self.flushes.lock().unwrap().push(seen);
        Box::pin(async {})
    }
}

/// A zone entry publishing each IP once
pub fn zone_entry(name: &str, ips: &[IpAddr]) -> ZoneEntry {
    ZoneEntry {
        name: name.to_string(),
        ttl: 120,
        proxied: false,
        ips: IpWeights::List(ips.iter().map(|ip| ip.to_string()).collect()),
    }
}

/// A weighted zone entry
pub fn weighted_entry(name: &str, weights: &[(IpAddr, u32)]) -> ZoneEntry {
    ZoneEntry {
        name: name.to_string(),
        ttl: 120,
        proxied: false,
        ips: IpWeights::Weighted(
            weights
                .iter()
                .map(|(ip, weight)| (ip.to_string(), *weight))
                .collect(),
        ),
    }
}

/// Helper to create a SyncConfig from (domain, zones) pairs
pub fn config_with(domains: Vec<(&str, Vec<ZoneEntry>)>) -> SyncConfig {
    SyncConfig {
        log_level: "debug".to_string(),
        health_source: HealthSourceConfig::Remnawave {
            api_url: "https://panel.example.com".to_string(),
            api_key: "test-key".to_string(),
        },
        provider: ProviderConfig::Cloudflare {
            api_token: "test-token".to_string(),
            dry_run: false,
        },
        notifier: NotifierConfig::None,
        engine: EngineConfig {
            check_interval_secs: 1,
            event_channel_capacity: 100,
        },
        domains: domains
            .into_iter()
            .map(|(domain, zones)| DomainConfig {
                domain: domain.to_string(),
                zones,
            })
            .collect(),
    }
}

/// Helper to create a minimal SyncConfig: `vpn.example.com` publishing `ips`
pub fn minimal_config(ips: &[IpAddr]) -> SyncConfig {
    config_with(vec![("example.com", vec![zone_entry("vpn", ips)])])
}
