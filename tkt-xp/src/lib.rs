//! tkt-xp library interface
//!
//! Experiment decisions and live datafile synchronization for the ticketing
//! apps. The binary wires these components together; integration tests drive
//! them directly.

pub mod agent;
pub mod api;
pub mod attributes;
pub mod datafile;
pub mod decision;
pub mod error;
pub mod homescreen;
pub mod notifier;
pub mod resolved;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};
pub use crate::resolved::Resolved;

use crate::attributes::AttributeStore;
use crate::datafile::ConfigurationStore;
use crate::decision::DecisionResolver;
use crate::notifier::Notifier;
use crate::sync::SyncController;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigurationStore>,
    pub attributes: Arc<AttributeStore>,
    pub resolver: Arc<DecisionResolver>,
    pub notifier: Arc<Notifier>,
    pub sync: Arc<SyncController>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Build state around an existing sync controller
    ///
    /// `store` and `notifier` must be the instances the controller was built
    /// with, otherwise swaps would not reach the resolver or the sessions.
    pub fn new(
        store: Arc<ConfigurationStore>,
        attributes: Arc<AttributeStore>,
        notifier: Arc<Notifier>,
        sync: Arc<SyncController>,
    ) -> Self {
        let resolver = Arc::new(DecisionResolver::new(
            Arc::clone(&store),
            Arc::clone(&attributes),
        ));
        Self {
            store,
            attributes,
            resolver,
            notifier,
            sync,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::feature_routes())
        .merge(api::homescreen_routes())
        .merge(api::purchase_routes())
        .merge(api::webhook_routes())
        .merge(api::push_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
