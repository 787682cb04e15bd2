//! Client Sync Agent
//!
//! One instance per connected client. Fetches the catalog and the homescreen
//! decision, resolves module content once per fetch, and re-fetches when the
//! push channel reports a configuration change.
//!
//! State machine: `Idle → Loading → Ready | Error`, plus `Ready → Loading`
//! on a push event. Guarantees:
//! - at most one fetch in flight; push events that arrive while loading mark
//!   the agent dirty, and any number of them cause exactly one follow-up
//!   fetch once the running one completes
//! - a manual `refresh()` supersedes the running fetch; the superseded
//!   result is discarded on arrival (generation check)
//! - last good data wins: a failed re-fetch keeps the previous snapshot and
//!   only reports the error alongside it

mod backend;

pub use backend::{HomescreenBackend, HomescreenPayload, HttpBackend};

use crate::attributes::UserId;
use crate::homescreen::{self, Event, HomescreenModule, ModuleContent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tkt_common::PushEvent;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Agent lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Everything a screen needs to render, computed once per fetch
#[derive(Debug, Clone)]
pub struct HomescreenSnapshot {
    pub variation_key: String,
    pub enabled: bool,
    pub modules: Vec<HomescreenModule>,
    /// Events per module id
    pub content: ModuleContent,
    pub catalog_size: usize,
    pub fetched_at: DateTime<Utc>,
}

impl HomescreenSnapshot {
    /// Events for a module, in render order
    pub fn events_for(&self, module_id: &str) -> &[Event] {
        self.content.get(module_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Observable agent view
#[derive(Debug, Clone)]
pub struct AgentView {
    pub state: AgentState,
    pub snapshot: Option<Arc<HomescreenSnapshot>>,
    /// Fatal in `Error`; a non-blocking stale-data indicator in `Ready`
    pub error: Option<String>,
}

impl AgentView {
    fn idle() -> Self {
        Self {
            state: AgentState::Idle,
            snapshot: None,
            error: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.state == AgentState::Ready && self.error.is_some()
    }
}

#[derive(Default)]
struct FetchControl {
    generation: u64,
    in_flight: Option<CancellationToken>,
    /// A change arrived while a fetch was in flight
    dirty: bool,
    fetches_issued: u64,
}

/// Per-client synchronization agent
pub struct ClientSyncAgent<B: HomescreenBackend> {
    backend: Arc<B>,
    user_id: UserId,
    operating_system: String,
    control: Mutex<FetchControl>,
    view: watch::Sender<AgentView>,
}

impl<B: HomescreenBackend> ClientSyncAgent<B> {
    pub fn new(backend: Arc<B>, user_id: UserId, operating_system: impl Into<String>) -> Arc<Self> {
        let (view, _) = watch::channel(AgentView::idle());
        Arc::new(Self {
            backend,
            user_id,
            operating_system: operating_system.into(),
            control: Mutex::new(FetchControl::default()),
            view,
        })
    }

    /// Observe view changes
    pub fn subscribe(&self) -> watch::Receiver<AgentView> {
        self.view.subscribe()
    }

    /// Current view
    pub fn view(&self) -> AgentView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> AgentState {
        self.view.borrow().state
    }

    /// Number of fetches started so far
    pub fn fetches_issued(&self) -> u64 {
        self.lock_control().fetches_issued
    }

    pub fn is_loading(&self) -> bool {
        self.lock_control().in_flight.is_some()
    }

    /// First mount: `Idle → Loading`. No-op in any other state.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut control = self.lock_control();
        if self.view.borrow().state != AgentState::Idle || control.in_flight.is_some() {
            return false;
        }
        self.begin_fetch(&mut control);
        true
    }

    /// Push-triggered refresh
    ///
    /// While a fetch is in flight the change is recorded and a single
    /// follow-up fetch runs after it completes. Returns whether a new fetch
    /// was issued now.
    pub fn notify_config_changed(self: &Arc<Self>) -> bool {
        let mut control = self.lock_control();
        if control.in_flight.is_some() {
            debug!(user_id = %self.user_id, "Refresh already in flight, coalescing");
            control.dirty = true;
            return false;
        }
        self.begin_fetch(&mut control);
        true
    }

    /// Manual refresh: cancels any running fetch and starts a new one
    pub fn refresh(self: &Arc<Self>) {
        let mut control = self.lock_control();
        if let Some(previous) = control.in_flight.take() {
            debug!(user_id = %self.user_id, "Superseding in-flight fetch");
            previous.cancel();
        }
        self.begin_fetch(&mut control);
    }

    /// Drive the agent from a push session until it closes
    ///
    /// The `connected` handshake starts the first fetch; on a reconnect it
    /// triggers a refresh, since updates may have been missed while away.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PushEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PushEvent::Connected => {
                    if !self.start() {
                        self.notify_config_changed();
                    }
                }
                PushEvent::DatafileUpdated { timestamp } => {
                    debug!(user_id = %self.user_id, timestamp, "Configuration changed");
                    self.notify_config_changed();
                }
            }
        }
        info!(user_id = %self.user_id, "Push channel closed, agent stopping");
    }

    fn begin_fetch(self: &Arc<Self>, control: &mut FetchControl) {
        control.generation += 1;
        control.dirty = false;
        control.fetches_issued += 1;
        let generation = control.generation;
        let token = CancellationToken::new();
        control.in_flight = Some(token.clone());

        self.view.send_modify(|view| view.state = AgentState::Loading);

        let agent = Arc::clone(self);
        tokio::spawn(async move {
            let fetched = tokio::select! {
                _ = token.cancelled() => None,
                result = agent.fetch() => Some(result),
            };
            match fetched {
                Some(result) => agent.complete(generation, result),
                None => debug!(generation, "Fetch cancelled"),
            }
        });
    }

    async fn fetch(&self) -> tkt_common::Result<HomescreenSnapshot> {
        let (catalog, payload) = tokio::join!(
            self.backend.fetch_catalog(),
            self.backend
                .fetch_homescreen(&self.user_id, &self.operating_system)
        );
        let catalog = catalog?;
        let payload = payload?;

        let content = homescreen::resolve(&payload.modules, &catalog);
        Ok(HomescreenSnapshot {
            variation_key: payload.variation_key,
            enabled: payload.enabled,
            modules: payload.modules,
            content,
            catalog_size: catalog.len(),
            fetched_at: Utc::now(),
        })
    }

    fn complete(self: &Arc<Self>, generation: u64, result: tkt_common::Result<HomescreenSnapshot>) {
        let mut control = self.lock_control();
        if control.generation != generation {
            debug!(generation, current = control.generation, "Discarding superseded fetch result");
            return;
        }
        control.in_flight = None;

        match result {
            Ok(snapshot) => {
                info!(
                    user_id = %self.user_id,
                    variation = %snapshot.variation_key,
                    modules = snapshot.modules.len(),
                    "Homescreen ready"
                );
                self.view.send_modify(|view| {
                    view.state = AgentState::Ready;
                    view.snapshot = Some(Arc::new(snapshot));
                    view.error = None;
                });
            }
            Err(e) => {
                warn!(user_id = %self.user_id, "Homescreen fetch failed: {}", e);
                self.view.send_modify(|view| {
                    view.state = if view.snapshot.is_some() {
                        AgentState::Ready
                    } else {
                        AgentState::Error
                    };
                    view.error = Some(e.to_string());
                });
            }
        }

        if control.dirty {
            debug!(user_id = %self.user_id, "Configuration changed during fetch, refetching");
            self.begin_fetch(&mut control);
        }
    }

    fn lock_control(&self) -> std::sync::MutexGuard<'_, FetchControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
