// # Change Notifier Trait
//
// Observer interface for record changes and failed provider actions.
//
// The engine always holds a notifier and calls it unconditionally; when
// notifications are disabled it holds a `NoopNotifier`.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A change that was applied to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// A record was created
    Added,
    /// A record was deleted
    Removed,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Added => f.write_str("added"),
            ChangeAction::Removed => f.write_str("removed"),
        }
    }
}

/// An action that failed against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorAction {
    /// Creating a record failed
    Add,
    /// Deleting a record failed
    Remove,
}

impl fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorAction::Add => f.write_str("add"),
            ErrorAction::Remove => f.write_str("remove"),
        }
    }
}

/// A record was added or removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsChange {
    /// Zone apex
    pub domain: String,
    /// Managed subdomain
    pub subdomain: String,
    /// Address the record points to
    pub ip: IpAddr,
    /// What happened
    pub action: ChangeAction,
}

/// A provider action failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsError {
    /// Zone apex
    pub domain: String,
    /// Managed subdomain
    pub subdomain: String,
    /// Address the action concerned
    pub ip: IpAddr,
    /// What was attempted
    pub action: ErrorAction,
    /// Provider error message
    pub error_message: String,
}

/// Trait for change notifier implementations
///
/// Both methods are synchronous and must return promptly: implementations
/// queue the event and deliver it elsewhere. A notifier must never block or
/// fail the reconciliation cycle; delivery problems are logged by the
/// implementation and otherwise dropped.
pub trait ChangeNotifier: Send + Sync {
    /// A record was added or removed
    fn notify_change(&self, change: DnsChange);

    /// A provider action failed
    fn notify_error(&self, error: DnsError);

    /// Resolve once every event queued so far has been handed off
    ///
    /// Called by the engine when it stops. Notifiers that deliver inline can
    /// keep the default.
    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Notifier used when notifications are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify_change(&self, _change: DnsChange) {}

    fn notify_error(&self, _error: DnsError) {}
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a ChangeNotifier instance from configuration
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn ChangeNotifier>, crate::Error>;
}
