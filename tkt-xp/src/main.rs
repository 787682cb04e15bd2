//! tkt-xp - Experiment decision and live datafile sync service
//!
//! Serves per-user experiment decisions and homescreen layouts, keeps the
//! datafile fresh (polling or webhook), and pushes change notifications to
//! connected clients over WebSocket/SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tkt_common::config::{self, SyncModeSetting, TomlConfig};
use tkt_xp::attributes::AttributeStore;
use tkt_xp::datafile::ConfigurationStore;
use tkt_xp::notifier::Notifier;
use tkt_xp::sync::{DatafileSource, HttpDatafileSource, SyncController, SyncMode, UnconfiguredSource};
use tkt_xp::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "tkt-xp";
const DEFAULT_LOG_FILTER: &str = "tkt_xp=info,tkt_common=info,tower_http=info";

/// Command-line arguments for tkt-xp
#[derive(Parser, Debug)]
#[command(name = "tkt-xp")]
#[command(about = "Experiment decision and datafile sync service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "TKT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "TKT_XP_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TKT_XP_PORT")]
    port: Option<u16>,

    /// Datafile sync strategy (polling | webhook)
    #[arg(long, env = "TKT_SYNC_MODE", value_parser = parse_sync_mode)]
    sync_mode: Option<SyncModeSetting>,

    /// Poll interval in milliseconds (polling mode)
    #[arg(long, env = "TKT_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Remote datafile URL
    #[arg(long, env = "TKT_DATAFILE_URL")]
    datafile_url: Option<String>,

    /// SDK key (datafile URL derived from it when no URL is given)
    #[arg(long, env = "TKT_SDK_KEY")]
    sdk_key: Option<String>,
}

fn parse_sync_mode(s: &str) -> std::result::Result<SyncModeSetting, String> {
    SyncModeSetting::from_str(s).ok_or_else(|| format!("unknown sync mode '{}'", s))
}

impl Args {
    /// Overlay CLI/ENV values onto the file configuration
    fn apply(&self, mut config: TomlConfig) -> TomlConfig {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.sync_mode {
            config.sync.mode = mode;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.sync.poll_interval_ms = ms;
        }
        if let Some(url) = &self.datafile_url {
            config.sync.datafile_url = Some(url.clone());
        }
        if let Some(key) = &self.sdk_key {
            config.sync.sdk_key = Some(key.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before tracing so the file can set the log level
    let config_path = config::resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let file_config = config::load_toml_config(config_path.as_deref())
        .context("Failed to load configuration")?;
    let config = args.apply(file_config);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| match &config.logging.level {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_new(DEFAULT_LOG_FILTER),
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tkt-xp v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: none (compiled defaults)"),
    }

    let store = Arc::new(ConfigurationStore::with_bundled_default());
    info!("Serving bundled datafile revision {}", store.revision());

    let attributes = Arc::new(AttributeStore::new(
        config.attributes.default_location.clone(),
    ));
    let notifier = Arc::new(Notifier::new());

    let source: Arc<dyn DatafileSource> = match config.sync.datafile_url() {
        Some(url) => {
            info!("Datafile source: {}", url);
            Arc::new(
                HttpDatafileSource::new(url, config.sync.fetch_timeout())
                    .context("Failed to create datafile source")?,
            )
        }
        None => {
            warn!("No datafile_url or sdk_key configured, serving bundled datafile only");
            Arc::new(UnconfiguredSource)
        }
    };

    let mode = SyncMode::from_settings(&config.sync);
    info!("Sync mode: {}", mode.name());
    let sync = Arc::new(SyncController::new(
        mode,
        Arc::clone(&store),
        Arc::clone(&notifier),
        source,
        config.sync.fetch_timeout(),
    ));

    let shutdown = CancellationToken::new();
    let poller = Arc::clone(&sync).spawn_polling(shutdown.clone());

    let state = AppState::new(store, attributes, notifier, sync);
    let app = tkt_xp::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            warn!("Polling task ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
