//! Core traits for the fleetdns system
//!
//! This module defines the abstract interfaces the engine talks to.
//!
//! - [`HealthSource`]: Report the health of every node in the fleet
//! - [`DnsProvider`]: List, create and delete A records in a zone
//! - [`ChangeNotifier`]: Observe record changes and failed actions

pub mod health_source;
pub mod dns_provider;
pub mod notifier;

pub use health_source::{HealthSource, NodeHealth, NodeDiagnostics, HealthSourceFactory};
pub use dns_provider::{DnsProvider, DnsRecord, NewRecord, DnsProviderFactory};
pub use notifier::{ChangeNotifier, DnsChange, DnsError, ChangeAction, ErrorAction, NoopNotifier, NotifierFactory};
