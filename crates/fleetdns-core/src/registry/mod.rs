//! Plugin-based component registry
//!
//! The registry allows DNS providers, health sources and notifiers to be
//! registered at runtime, avoiding hardcoded if-else chains in the daemon.
//!
//! ## Registration
//!
//! Plugin crates export a `register` function:
//!
//! ```rust,ignore
//! // In fleetdns-provider-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```
//!
//! The daemon then builds every component from configuration:
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::new();
//! fleetdns_provider_cloudflare::register(&registry);
//! let provider = registry.create_provider(&config.provider)?;
//! ```

use crate::config::{HealthSourceConfig, NotifierConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{ChangeNotifier, DnsProvider, HealthSource, NoopNotifier};
use crate::traits::{DnsProviderFactory, HealthSourceFactory, NotifierFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry mapping component type names to factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered health source factories
    health_sources: RwLock<HashMap<String, Box<dyn HealthSourceFactory>>>,

    /// Registered notifier factories
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under a type name (e.g., "cloudflare")
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a health source factory under a type name (e.g., "remnawave")
    pub fn register_health_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn HealthSourceFactory>,
    ) {
        self.health_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a notifier factory under a type name (e.g., "telegram")
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        self.notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: If the provider type is not registered
    /// - `Err(Error)`: If creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a health source from configuration
    pub fn create_health_source(&self, config: &HealthSourceConfig) -> Result<Box<dyn HealthSource>> {
        let source_type = config.type_name();
        let sources = self
            .health_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::config(format!("Unknown health source type: {}", source_type))
        })?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    ///
    /// `NotifierConfig::None` always yields a [`NoopNotifier`].
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn ChangeNotifier>> {
        if let NotifierConfig::None = config {
            return Ok(Box::new(NoopNotifier));
        }

        let notifier_type = config.type_name();
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = notifiers
            .get(notifier_type)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", notifier_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered health source types
    pub fn list_health_sources(&self) -> Vec<String> {
        let sources = self
            .health_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// List all registered notifier types
    pub fn list_notifiers(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);
        notifiers.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a health source type is registered
    pub fn has_health_source(&self, name: &str) -> bool {
        let sources = self
            .health_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);
        notifiers.contains_key(name)
    }
}
