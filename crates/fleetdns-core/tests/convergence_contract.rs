//! Architectural Contract Test: Convergence
//!
//! This test verifies that the engine drives the provider to the desired
//! state and then leaves it alone.
//!
//! Constraints verified:
//! - Healthy configured IPs are published exactly `weight` times
//! - Unhealthy and unconfigured IPs are removed
//! - A converged zone produces zero provider mutations
//! - Records are re-listed every cycle, never cached
//!
//! If this test fails, someone has added:
//! - Record caching between cycles
//! - Decisions outside the reconciliation diff
//! - Health filtering that ignores the configured IP set

mod common;

use common::*;
use fleetdns_core::SyncEngine;
use fleetdns_core::traits::{ChangeAction, NodeHealth};

const VPN: &str = "vpn.example.com";

fn engine_for(
    source: &ScriptedHealthSource,
    provider: &InMemoryProvider,
    notifier: &RecordingNotifier,
    config: fleetdns_core::SyncConfig,
) -> SyncEngine {
    let (engine, _event_rx) = SyncEngine::new(
        Box::new(source.clone()),
        Box::new(provider.clone()),
        Box::new(notifier.clone()),
        config,
    )
    .expect("engine construction succeeds");
    engine
}

#[tokio::test]
async fn empty_zone_is_populated_then_left_alone() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(2)]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1), ip(2)]));

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(report.removed, 0);
    assert_eq!(provider.ips(VPN), vec![ip(1), ip(2)]);

    let mutations = provider.mutation_count();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added + report.removed, 0);
    assert_eq!(
        provider.mutation_count(),
        mutations,
        "Converged zone must not be touched"
    );
    assert_eq!(notifier.changes().len(), 2);
}

#[tokio::test]
async fn records_are_relisted_every_cycle() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1)]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1)]));

    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();

    assert_eq!(provider.list_calls(), 3);
    assert_eq!(provider.zone_lookups(), 1, "Zone IDs are cached");
}

#[tokio::test]
async fn one_name_configured_twice_never_reaches_the_loop() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(2)]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();

    let same_domain = config_with(vec![(
        "example.com",
        vec![zone_entry("vpn", &[ip(1)]), zone_entry("vpn", &[ip(2)])],
    )]);
    let domain_listed_twice = config_with(vec![
        ("example.com", vec![zone_entry("vpn", &[ip(1)])]),
        ("example.com", vec![zone_entry("vpn", &[ip(2)])]),
    ]);

    for config in [same_domain, domain_listed_twice] {
        let Err(err) = SyncEngine::new(
            Box::new(source.clone()),
            Box::new(provider.clone()),
            Box::new(notifier.clone()),
            config,
        ) else {
            panic!("Two entries for one name would delete each other's records every cycle");
        };
        assert!(err.is_fatal());
    }

    assert_eq!(provider.mutation_count(), 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn startup_pass_only_reads() {
    let source = ScriptedHealthSource::new(vec![unhealthy_node(1)]);
    let provider = InMemoryProvider::new();
    provider.seed("zone-example", VPN, ip(1));
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1), ip(2)]));

    engine.log_zones().await;

    assert_eq!(provider.mutation_count(), 0);
    assert_eq!(provider.list_calls(), 1);
    assert_eq!(source.calls(), 0, "Startup pass never asks for health");
    assert_eq!(engine.resolver().len().await, 1);
}

#[tokio::test]
async fn unhealthy_node_is_removed_and_restored() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(2)]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1), ip(2)]));

    engine.run_cycle().await.unwrap();

    source.set_nodes(vec![healthy_node(1), unhealthy_node(2)]);
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(provider.ips(VPN), vec![ip(1)]);

    let removed: Vec<_> = notifier
        .changes()
        .into_iter()
        .filter(|c| c.action == ChangeAction::Removed)
        .collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].ip, ip(2));
    assert_eq!(removed[0].domain, "example.com");
    assert_eq!(removed[0].subdomain, "vpn");

    source.set_nodes(vec![healthy_node(1), healthy_node(2)]);
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(provider.ips(VPN), vec![ip(1), ip(2)]);
}

#[tokio::test]
async fn weights_publish_duplicate_records() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(2)]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();
    let config = config_with(vec![(
        "example.com",
        vec![weighted_entry("vpn", &[(ip(1), 3), (ip(2), 1)])],
    )]);
    let engine = engine_for(&source, &provider, &notifier, config);

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added, 4);
    assert_eq!(provider.ips(VPN), vec![ip(1), ip(1), ip(1), ip(2)]);

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added + report.removed, 0);
}

#[tokio::test]
async fn excess_duplicates_are_trimmed_oldest_first() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1)]);
    let provider = InMemoryProvider::new();
    let first = provider.seed("zone-example", VPN, ip(1));
    let second = provider.seed("zone-example", VPN, ip(1));
    let third = provider.seed("zone-example", VPN, ip(1));
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1)]));

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(provider.deletes(), vec![first, second]);
    assert_eq!(provider.ips(VPN), vec![ip(1)]);
    assert!(!provider.deletes().contains(&third));
}

#[tokio::test]
async fn unconfigured_record_is_purged() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(9)]);
    let provider = InMemoryProvider::new();
    let stray = provider.seed("zone-example", VPN, ip(9));
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1)]));

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(provider.deletes(), vec![stray]);
    assert_eq!(provider.ips(VPN), vec![ip(1)]);
}

#[tokio::test]
async fn healthy_nodes_outside_the_config_are_never_published() {
    let source = ScriptedHealthSource::new(vec![
        healthy_node(1),
        healthy_node(5),
        NodeHealth::new("by-name", "edge.example.net", true),
    ]);
    let provider = InMemoryProvider::new();
    let notifier = RecordingNotifier::new();
    let engine = engine_for(&source, &provider, &notifier, minimal_config(&[ip(1)]));

    engine.run_cycle().await.unwrap();
    assert_eq!(provider.ips(VPN), vec![ip(1)]);
}

#[tokio::test]
async fn each_managed_name_converges_independently() {
    let source = ScriptedHealthSource::new(vec![healthy_node(1), healthy_node(2)]);
    let provider = InMemoryProvider::new();
    provider.add_zone("example.org", "zone-org");
    let notifier = RecordingNotifier::new();
    let config = config_with(vec![
        (
            "example.com",
            vec![zone_entry("vpn", &[ip(1)]), zone_entry("@", &[ip(2)])],
        ),
        ("example.org", vec![zone_entry("edge", &[ip(1), ip(2)])]),
    ]);
    let engine = engine_for(&source, &provider, &notifier, config);
    assert_eq!(engine.zones_count(), 3);

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.zones_synced, 3);
    assert_eq!(provider.ips(VPN), vec![ip(1)]);
    assert_eq!(provider.ips("example.com"), vec![ip(2)]);
    assert_eq!(provider.ips("edge.example.org"), vec![ip(1), ip(2)]);

    let created = provider.creates();
    assert!(created.iter().all(|r| r.ttl == 120 && !r.proxied));
}
