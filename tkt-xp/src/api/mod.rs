//! HTTP surface for tkt-xp
//!
//! REST endpoints for decisions, the homescreen layout, purchase recording
//! and the datafile webhook, plus the push channel (WebSocket and SSE).

pub mod features;
pub mod health;
pub mod homescreen;
pub mod purchases;
pub mod push;
pub mod webhook;

pub use features::feature_routes;
pub use health::health_routes;
pub use homescreen::homescreen_routes;
pub use purchases::purchase_routes;
pub use push::push_routes;
pub use webhook::webhook_routes;

use crate::attributes::UserId;
use crate::error::ApiError;
use serde::Deserialize;

/// Device attributes passed on decision queries
#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    pub operating_system: Option<String>,
}

impl DeviceQuery {
    pub fn operating_system(&self) -> &str {
        self.operating_system
            .as_deref()
            .map(str::trim)
            .filter(|os| !os.is_empty())
            .unwrap_or("unknown")
    }
}

/// Validate a path user id before any component sees it
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    Ok(UserId::parse(raw)?)
}

/// Handler for routes reached without a user id segment
pub(crate) async fn missing_user_id() -> ApiError {
    ApiError::BadRequest("userId must not be empty".to_string())
}
