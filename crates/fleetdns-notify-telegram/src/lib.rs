// # Telegram Notifier
//
// This crate provides a `ChangeNotifier` that posts record changes and failed
// provider actions to a Telegram chat.
//
// ## Architecture
//
// ```text
// SyncEngine ──notify_*──▶ TelegramNotifier ──try_send──▶ bounded queue
//                                                              │
//                                                              ▼
//                                       worker task ──POST──▶ /bot<token>/sendMessage
// ```
//
// The engine-facing half never awaits: a full queue drops the message with a
// warning. The worker owns all I/O and logs delivery failures. `flush` queues a
// marker behind pending messages and resolves when the worker reaches it, so
// the engine can stop without losing its last cycle's notifications. Dropping
// the notifier closes the queue; the worker drains what is left and exits.

use fleetdns_core::ProviderRegistry;
use fleetdns_core::config::NotifierConfig;
use fleetdns_core::traits::{
    ChangeAction, ChangeNotifier, DnsChange, DnsError, NotifierFactory,
};
use fleetdns_core::{Error, Result};

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default number of queued messages
const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default HTTP timeout for sendMessage calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram notifier settings
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token
    /// ⚠️ NEVER log this value
    pub bot_token: String,
    /// Target chat
    pub chat_id: String,
    /// Send a message for every added/removed record
    pub notify_dns_changes: bool,
    /// Send a message for every failed action
    pub notify_errors: bool,
    /// Bot API base URL (overridable for tests)
    pub api_base: String,
    /// Maximum number of undelivered messages
    pub queue_capacity: usize,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .field("notify_dns_changes", &self.notify_dns_changes)
            .field("notify_errors", &self.notify_errors)
            .field("api_base", &self.api_base)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            notify_dns_changes: true,
            notify_errors: true,
            api_base: TELEGRAM_API_BASE.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Build from the `telegram` notifier section
    pub fn from_notifier_config(config: &NotifierConfig) -> Result<Self> {
        match config {
            NotifierConfig::Telegram {
                bot_token,
                chat_id,
                notify_dns_changes,
                notify_errors,
            } => Ok(Self {
                notify_dns_changes: *notify_dns_changes,
                notify_errors: *notify_errors,
                ..Self::new(bot_token.clone(), chat_id.clone())
            }),
            _ => Err(Error::config("Invalid config for Telegram notifier")),
        }
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

/// Work item for the delivery worker
enum Job {
    Send(String),
    Flush(oneshot::Sender<()>),
}

/// Change notifier that queues messages for a Telegram worker task
pub struct TelegramNotifier {
    tx: mpsc::Sender<Job>,
    notify_dns_changes: bool,
    notify_errors: bool,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("notify_dns_changes", &self.notify_dns_changes)
            .field("notify_errors", &self.notify_errors)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    /// Start the delivery worker and return the notifier feeding it
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// A tuple of (notifier, worker_handle). The worker exits once the
    /// notifier is dropped and the queue is drained.
    pub fn spawn(config: TelegramConfig) -> Result<(Self, JoinHandle<()>)> {
        if config.bot_token.is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }
        if config.chat_id.is_empty() {
            return Err(Error::config("Telegram chat ID cannot be empty"));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::config("Telegram notifier must be created inside a Tokio runtime")
        })?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Worker {
            client,
            url: config.send_message_url(),
            chat_id: config.chat_id.clone(),
            rx,
        };
        let handle = runtime.spawn(worker.run());

        let notifier = Self {
            tx,
            notify_dns_changes: config.notify_dns_changes,
            notify_errors: config.notify_errors,
        };

        Ok((notifier, handle))
    }

    fn enqueue(&self, text: String) {
        match self.tx.try_send(Job::Send(text)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Telegram queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Telegram worker stopped, dropping notification");
            }
        }
    }
}

impl ChangeNotifier for TelegramNotifier {
    fn notify_change(&self, change: DnsChange) {
        if self.notify_dns_changes {
            self.enqueue(format_change(&change));
        }
    }

    fn notify_error(&self, error: DnsError) {
        if self.notify_errors {
            self.enqueue(format_error(&error));
        }
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let (ack_tx, ack_rx) = oneshot::channel();
            if self.tx.send(Job::Flush(ack_tx)).await.is_err() {
                return;
            }
            let _ = ack_rx.await;
        })
    }
}

fn fqdn(domain: &str, subdomain: &str) -> String {
    if subdomain == "@" {
        domain.to_string()
    } else {
        format!("{}.{}", subdomain, domain)
    }
}

/// Message text for an applied change
pub fn format_change(change: &DnsChange) -> String {
    let (icon, verb) = match change.action {
        ChangeAction::Added => ("🟢", "added"),
        ChangeAction::Removed => ("🔴", "removed"),
    };
    format!(
        "{} DNS record {}\n{} → {}",
        icon,
        verb,
        fqdn(&change.domain, &change.subdomain),
        change.ip
    )
}

/// Message text for a failed action
pub fn format_error(error: &DnsError) -> String {
    format!(
        "⚠️ Failed to {} DNS record\n{} → {}\nError: {}",
        error.action,
        fqdn(&error.domain, &error.subdomain),
        error.ip,
        error.error_message
    )
}

/// Background task delivering queued messages
struct Worker {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    rx: mpsc::Receiver<Job>,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!("Telegram worker started");
        while let Some(job) = self.rx.recv().await {
            match job {
                Job::Send(text) => {
                    if let Err(e) = self.send(&text).await {
                        tracing::warn!("Failed to send Telegram notification: {}", e);
                    }
                }
                Job::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!("Telegram worker stopped");
    }

    async fn send(&self, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        // The URL embeds the bot token, so reqwest errors are stripped of it
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http(format!("Telegram API error: {} - {}", status, body)));
        }

        Ok(())
    }
}

/// Factory for creating Telegram notifiers
///
/// The worker handle is detached. The engine flushes the notifier when it
/// stops, and the worker ends once the notifier is dropped.
pub struct TelegramFactory;

impl NotifierFactory for TelegramFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn ChangeNotifier>> {
        let config = TelegramConfig::from_notifier_config(config)?;
        let (notifier, _worker) = TelegramNotifier::spawn(config)?;
        Ok(Box::new(notifier))
    }
}

/// Register the Telegram notifier with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_notifier("telegram", Box::new(TelegramFactory));
}
