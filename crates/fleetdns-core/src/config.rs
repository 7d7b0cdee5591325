//! Configuration types for the fleetdns system
//!
//! Configuration is a YAML document loaded once at startup and treated as
//! immutable for the lifetime of the process. String values may reference
//! environment variables as `${NAME}`, which keeps API credentials out of the
//! file itself.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::path::Path;

use crate::error::{Error, Result};

/// Upper bound on records published for one address under one name
pub const MAX_WEIGHT: u32 = 100;

/// Main fleetdns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Health source configuration
    pub health_source: HealthSourceConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Change notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Domains and the zones managed under each of them
    pub domains: Vec<DomainConfig>,
}

impl SyncConfig {
    /// Load and parse a configuration file, substituting `${VAR}` from the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a configuration document, substituting `${VAR}` from the environment
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Self::from_yaml_str_with(raw, |name| std::env::var(name).ok())
    }

    /// Parse a configuration document with a custom variable lookup
    pub fn from_yaml_str_with<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut document: serde_yaml::Value = serde_yaml::from_str(raw)?;
        substitute_value(&mut document, &lookup);
        Ok(serde_yaml::from_value(document)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(Error::config("No domains configured"));
        }

        for domain in &self.domains {
            domain.validate()?;
        }

        let mut names = HashSet::new();
        for zone in self.zones()? {
            let fqdn = zone.fqdn().to_ascii_lowercase();
            if names.contains(&fqdn) {
                return Err(Error::config(format!(
                    "{} is configured more than once",
                    fqdn
                )));
            }
            names.insert(fqdn);
        }

        self.health_source.validate()?;
        self.provider.validate()?;
        self.notifier.validate()?;
        self.engine.validate()?;

        Ok(())
    }

    /// Flatten all domains into the per-zone view consumed by the engine
    pub fn zones(&self) -> Result<Vec<ZoneConfig>> {
        let mut zones = Vec::new();
        for domain in &self.domains {
            for entry in &domain.zones {
                zones.push(ZoneConfig {
                    domain: domain.domain.clone(),
                    subdomain: entry.name.clone(),
                    desired: entry.ips.resolve()?,
                    ttl: entry.ttl,
                    proxied: entry.proxied,
                });
            }
        }
        Ok(zones)
    }
}

/// Walk a YAML tree and expand `${VAR}` in every string
fn substitute_value<F>(value: &mut serde_yaml::Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        serde_yaml::Value::String(s) => {
            if s.contains("${") {
                *s = substitute_env(s, lookup);
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                substitute_value(item, lookup);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                substitute_value(item, lookup);
            }
        }
        _ => {}
    }
}

/// Expand `${VAR}` placeholders; unset variables become the empty string
pub fn substitute_env<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder, keep it verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Health source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthSourceConfig {
    /// Remnawave control-plane API
    Remnawave {
        /// Panel base URL (e.g., "https://panel.example.com")
        api_url: String,
        /// API key sent as a bearer token
        api_key: String,
    },

    /// Custom health source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl HealthSourceConfig {
    /// Validate the health source configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            HealthSourceConfig::Remnawave { api_url, api_key } => {
                if api_url.is_empty() {
                    return Err(Error::config("Remnawave API URL cannot be empty"));
                }
                if !api_url.starts_with("https://") && !api_url.starts_with("http://") {
                    return Err(Error::config(format!(
                        "Remnawave API URL must use HTTP or HTTPS scheme. Got: {}",
                        api_url
                    )));
                }
                if api_key.is_empty() {
                    return Err(Error::config("Remnawave API key cannot be empty"));
                }
                Ok(())
            }
            HealthSourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom health source factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the health source type name
    pub fn type_name(&self) -> &str {
        match self {
            HealthSourceConfig::Remnawave { .. } => "remnawave",
            HealthSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token with Zone:DNS:Edit permissions
        api_token: String,
        /// Perform reads only and log intended writes
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(Error::config("Custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Change notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Notifications disabled
    #[default]
    None,

    /// Telegram bot notifications
    Telegram {
        /// Bot token issued by BotFather
        bot_token: String,
        /// Target chat ID
        chat_id: String,
        /// Send a message for every record added or removed
        #[serde(default = "default_true")]
        notify_dns_changes: bool,
        /// Send a message for every failed provider action
        #[serde(default = "default_true")]
        notify_errors: bool,
    },

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            NotifierConfig::None => Ok(()),
            NotifierConfig::Telegram {
                bot_token, chat_id, ..
            } => {
                if bot_token.is_empty() {
                    return Err(Error::config("Telegram bot token cannot be empty"));
                }
                if chat_id.is_empty() {
                    return Err(Error::config("Telegram chat ID cannot be empty"));
                }
                Ok(())
            }
            NotifierConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom notifier factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::None => "none",
            NotifierConfig::Telegram { .. } => "telegram",
            NotifierConfig::Custom { factory, .. } => factory,
        }
    }
}

/// A domain (provider zone) and the record names managed inside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Zone apex, e.g. "example.com"
    pub domain: String,

    /// Managed record names under this domain
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

impl DomainConfig {
    fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::config("Domain name cannot be empty"));
        }
        if self.zones.is_empty() {
            return Err(Error::config(format!(
                "Domain {} has no zones configured",
                self.domain
            )));
        }
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                return Err(Error::config(format!(
                    "Zone name cannot be empty (domain {})",
                    self.domain
                )));
            }
            if zone.ttl == 0 {
                return Err(Error::config(format!(
                    "TTL must be > 0 for {}.{}",
                    zone.name, self.domain
                )));
            }
            zone.ips.resolve().map_err(|e| {
                Error::config(format!("{}.{}: {}", zone.name, self.domain, e))
            })?;
        }
        Ok(())
    }
}

/// One managed record name and its candidate IPs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEntry {
    /// Subdomain label, or "@" for the domain apex
    pub name: String,

    /// Record TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Whether records are proxied by the provider
    #[serde(default)]
    pub proxied: bool,

    /// Candidate IPs, either a plain list or an IP -> weight map
    #[serde(default)]
    pub ips: IpWeights,
}

/// Candidate IPs as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpWeights {
    /// Plain list; each listed address has weight 1
    List(Vec<String>),
    /// Address -> number of records to publish
    Weighted(BTreeMap<String, u32>),
}

impl Default for IpWeights {
    fn default() -> Self {
        IpWeights::List(Vec::new())
    }
}

impl IpWeights {
    /// Parse addresses and weights into the engine's desired map
    ///
    /// Addresses must be IPv4 (records are A records) and weights between 1
    /// and `MAX_WEIGHT`. An address listed twice counts twice.
    pub fn resolve(&self) -> Result<BTreeMap<IpAddr, u32>> {
        let mut desired = BTreeMap::new();
        match self {
            IpWeights::List(ips) => {
                for raw in ips {
                    add_weight(&mut desired, raw, 1)?;
                }
            }
            IpWeights::Weighted(weights) => {
                for (raw, weight) in weights {
                    if *weight == 0 {
                        return Err(Error::config(format!("Weight for {} must be > 0", raw)));
                    }
                    add_weight(&mut desired, raw, *weight)?;
                }
            }
        }
        Ok(desired)
    }
}

fn add_weight(desired: &mut BTreeMap<IpAddr, u32>, raw: &str, weight: u32) -> Result<()> {
    let total = desired.entry(parse_ipv4(raw)?).or_insert(0);
    *total = total
        .checked_add(weight)
        .filter(|total| *total <= MAX_WEIGHT)
        .ok_or_else(|| {
            Error::config(format!(
                "Weight for {} exceeds the maximum of {}",
                raw.trim(),
                MAX_WEIGHT
            ))
        })?;
    Ok(())
}

fn parse_ipv4(raw: &str) -> Result<IpAddr> {
    let ip: IpAddr = raw
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid IP address: {}", raw)))?;
    if !ip.is_ipv4() {
        return Err(Error::config(format!(
            "Only IPv4 addresses can be published as A records: {}",
            raw
        )));
    }
    Ok(ip)
}

/// Flattened, validated view of one managed record name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Zone apex, e.g. "example.com"
    pub domain: String,
    /// Subdomain label, or "@" for the apex
    pub subdomain: String,
    /// IP -> number of records to publish while healthy
    pub desired: BTreeMap<IpAddr, u32>,
    /// Record TTL in seconds
    pub ttl: u32,
    /// Whether records are proxied
    pub proxied: bool,
}

impl ZoneConfig {
    /// Fully qualified record name
    pub fn fqdn(&self) -> String {
        if self.subdomain == "@" {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }
}

/// Union of every configured IP across all zones
pub fn configured_ips(zones: &[ZoneConfig]) -> BTreeSet<IpAddr> {
    zones
        .iter()
        .flat_map(|zone| zone.desired.keys().copied())
        .collect()
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between convergence cycles (in seconds)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(Error::config("Check interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl() -> u32 {
    120
}

fn default_true() -> bool {
    true
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}
