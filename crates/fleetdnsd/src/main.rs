// # fleetdnsd - fleet DNS daemon
//
// This daemon is a thin integration layer. All reconciliation logic lives in
// fleetdns-core; the daemon only:
//
// 1. Loads the YAML configuration file
// 2. Initializes logging and the runtime
// 3. Registers the built-in health sources, providers and notifiers
// 4. Starts the sync engine and forwards shutdown signals to it
//
// ## Environment
//
// - `FLEETDNS_CONFIG`: Path to the configuration file (default `config.yml`)
// - `FLEETDNS_LOG_LEVEL`: Overrides `log_level` from the file
// - `FLEETDNS_MODE=dry-run`: Read from DNS but never modify it
//
// Secrets are normally referenced from the file as `${VAR}`:
//
// ```bash
// export REMNAWAVE_API_URL=https://panel.example.com
// export REMNAWAVE_API_KEY=...
// export CLOUDFLARE_API_TOKEN=...
// FLEETDNS_CONFIG=/etc/fleetdns/config.yml fleetdnsd
// ```

use anyhow::{Context, Result};
use fleetdns_core::{ProviderRegistry, SyncConfig, SyncEngine};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FleetExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FleetExitCode> for ExitCode {
    fn from(code: FleetExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Parse a log level name
fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Load and validate the configuration file
fn load_config(path: &str) -> Result<SyncConfig> {
    let config = SyncConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> ExitCode {
    let config_path =
        env::var("FLEETDNS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return FleetExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let level_name = env::var("FLEETDNS_LOG_LEVEL").unwrap_or_else(|_| config.log_level.clone());
    let Some(log_level) = parse_level(&level_name) else {
        eprintln!(
            "Configuration error: log level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level_name
        );
        return FleetExitCode::ConfigError.into();
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FleetExitCode::ConfigError.into();
    }

    info!("Starting fleetdnsd daemon");
    info!(
        "Configuration loaded from {}: {} domain(s)",
        config_path,
        config.domains.len()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FleetExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let engine = match build_engine(config) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return FleetExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(engine).await {
            error!("Daemon error: {:#}", e);
            FleetExitCode::RuntimeError
        } else {
            FleetExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Create every component through the registry and assemble the engine
///
/// Must run inside the runtime: notifiers may spawn their delivery task.
fn build_engine(config: SyncConfig) -> Result<SyncEngine> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "remnawave")]
    {
        debug!("Registering Remnawave health source");
        fleetdns_health_remnawave::register(&registry);
    }

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare provider");
        fleetdns_provider_cloudflare::register(&registry);
    }

    #[cfg(feature = "telegram")]
    {
        debug!("Registering Telegram notifier");
        fleetdns_notify_telegram::register(&registry);
    }

    info!("Health source type: {}", config.health_source.type_name());
    info!("Provider type: {}", config.provider.type_name());
    info!("Notifier type: {}", config.notifier.type_name());

    let health_source = registry
        .create_health_source(&config.health_source)
        .context("Failed to create health source")?;
    let provider = registry
        .create_provider(&config.provider)
        .context("Failed to create DNS provider")?;
    let notifier = registry
        .create_notifier(&config.notifier)
        .context("Failed to create notifier")?;

    let (engine, mut event_rx) = SyncEngine::new(health_source, provider, notifier, config)
        .context("Failed to create sync engine")?;

    // Keep the event channel drained; events are only traced here
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "engine event");
        }
    });

    Ok(engine)
}

/// Run the engine until a shutdown signal arrives
async fn run_daemon(engine: SyncEngine) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received shutdown signal: {}", signal);
                info!("Finishing current cycle before shutdown");
            }
            Err(e) => {
                warn!("Signal handling failed, shutting down: {}", e);
            }
        }
        let _ = shutdown_tx.send(());
    });

    info!("Daemon initialized successfully");
    engine.run_with_shutdown(Some(shutdown_rx)).await?;
    info!("Shutting down daemon");

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
