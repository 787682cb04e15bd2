//! Sync Controller
//!
//! Keeps the Configuration Store current using exactly one strategy, chosen
//! at startup:
//! - Polling: a recurring timer fetches the datafile
//! - Webhook-driven: each inbound refresh request triggers one fetch
//!
//! Both paths share the same fetch → compare revision → swap → broadcast
//! step. At most one fetch is in flight; a request that arrives while one is
//! running is dropped, since the running fetch already picks up the latest
//! data. A failed fetch never advances the last known revision.

mod source;

pub use source::{DatafileSource, HttpDatafileSource, UnconfiguredSource};

use crate::datafile::{ConfigurationStore, Datafile};
use crate::notifier::Notifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tkt_common::config::{SyncModeSetting, SyncSettings};
use tkt_common::{Error, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Active distribution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Polling { interval: Duration },
    WebhookDriven,
}

impl SyncMode {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        match settings.mode {
            SyncModeSetting::Polling => SyncMode::Polling {
                interval: settings.poll_interval(),
            },
            SyncModeSetting::Webhook => SyncMode::WebhookDriven,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Polling { .. } => "polling",
            SyncMode::WebhookDriven => "webhook",
        }
    }
}

/// Result of one fetch-and-compare pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// New revision swapped in and broadcast
    Updated { revision: String, recipients: usize },
    /// Fetched revision equals the last known one
    Unchanged { revision: String },
    /// Another fetch was already running; this request was dropped
    InFlight,
}

/// Result of an inbound webhook call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Polling is authoritative; nothing was fetched
    IgnoredPollingActive,
    Completed(SyncOutcome),
    Failed(String),
}

/// Diagnostics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub mode: &'static str,
    pub poll_interval_ms: Option<u64>,
    pub source: String,
    pub last_known_revision: Option<String>,
    pub active_revision: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub swap_count: u64,
    pub sessions: usize,
}

#[derive(Debug, Default)]
struct SyncState {
    last_known_revision: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    swap_count: u64,
}

/// Owner of the datafile refresh cycle
pub struct SyncController {
    mode: SyncMode,
    store: Arc<ConfigurationStore>,
    notifier: Arc<Notifier>,
    source: Arc<dyn DatafileSource>,
    fetch_timeout: Duration,
    /// Held for the duration of one fetch-swap pass
    in_flight: tokio::sync::Mutex<()>,
    state: Mutex<SyncState>,
}

impl SyncController {
    pub fn new(
        mode: SyncMode,
        store: Arc<ConfigurationStore>,
        notifier: Arc<Notifier>,
        source: Arc<dyn DatafileSource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            mode,
            store,
            notifier,
            source,
            fetch_timeout,
            in_flight: tokio::sync::Mutex::new(()),
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Fetch, compare revision, swap and broadcast if it changed
    ///
    /// Returns `InFlight` without fetching when another pass is running.
    /// Errors leave both the store and the last known revision untouched.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Datafile fetch already in flight, dropping request");
            return Ok(SyncOutcome::InFlight);
        };

        let result = self.fetch_and_apply().await;

        let mut state = self.lock_state();
        state.last_sync_at = Some(Utc::now());
        match &result {
            Ok(_) => state.last_error = None,
            Err(e) => state.last_error = Some(e.to_string()),
        }
        result
    }

    async fn fetch_and_apply(&self) -> Result<SyncOutcome> {
        let bytes = tokio::time::timeout(self.fetch_timeout, self.source.fetch())
            .await
            .map_err(|_| {
                Error::Fetch(format!(
                    "datafile fetch timed out after {} ms",
                    self.fetch_timeout.as_millis()
                ))
            })??;

        let datafile = Datafile::parse(&bytes)?;
        let revision = datafile.revision.clone();

        let unchanged = self.lock_state().last_known_revision.as_deref() == Some(revision.as_str());
        if unchanged {
            debug!(revision = %revision, "Datafile revision unchanged");
            return Ok(SyncOutcome::Unchanged { revision });
        }

        self.store.swap(datafile);
        {
            let mut state = self.lock_state();
            state.last_known_revision = Some(revision.clone());
            state.swap_count += 1;
        }
        let recipients = self.notifier.broadcast();
        info!(revision = %revision, recipients, "Applied new datafile revision");

        Ok(SyncOutcome::Updated {
            revision,
            recipients,
        })
    }

    /// Handle an inbound "datafile updated" webhook
    pub async fn handle_webhook(&self) -> WebhookOutcome {
        if let SyncMode::Polling { .. } = self.mode {
            info!("Webhook received while polling is active, ignoring");
            return WebhookOutcome::IgnoredPollingActive;
        }

        match self.sync_once().await {
            Ok(outcome) => WebhookOutcome::Completed(outcome),
            Err(e) => {
                warn!("Webhook-triggered refresh failed: {}", e);
                WebhookOutcome::Failed(e.to_string())
            }
        }
    }

    /// Start the polling loop (Polling mode only)
    ///
    /// The first tick fires immediately. Ticks that come due while a fetch is
    /// still running are skipped rather than queued.
    pub fn spawn_polling(self: Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let SyncMode::Polling { interval: period } = self.mode else {
            info!("Webhook-driven sync, polling loop not started");
            return None;
        };

        info!(
            "Starting datafile polling (interval: {} ms, source: {})",
            period.as_millis(),
            self.source.describe()
        );

        Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Datafile polling stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        if let Err(e) = self.sync_once().await {
                            warn!("Datafile poll failed, will retry next tick: {}", e);
                        }
                    }
                }
            }
        }))
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.lock_state();
        SyncStatus {
            mode: self.mode.name(),
            poll_interval_ms: match self.mode {
                SyncMode::Polling { interval } => Some(interval.as_millis() as u64),
                SyncMode::WebhookDriven => None,
            },
            source: self.source.describe(),
            last_known_revision: state.last_known_revision.clone(),
            active_revision: self.store.revision(),
            last_sync_at: state.last_sync_at,
            last_error: state.last_error.clone(),
            swap_count: state.swap_count,
            sessions: self.notifier.session_count(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
