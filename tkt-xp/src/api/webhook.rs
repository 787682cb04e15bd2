//! Datafile webhook endpoint

use crate::sync::{SyncOutcome, WebhookOutcome};
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    /// refreshed | unchanged | in_flight | ignored | failed
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
}

impl WebhookResponse {
    fn ok(outcome: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            outcome,
            revision: None,
            recipients: None,
        }
    }
}

/// POST /datafileUpdated
///
/// Only acts in webhook-driven mode. In polling mode the call is answered as
/// a successful no-op so a misconfigured sender is visible but harmless.
pub async fn datafile_updated(
    State(state): State<AppState>,
) -> (StatusCode, Json<WebhookResponse>) {
    let response = match state.sync.handle_webhook().await {
        WebhookOutcome::IgnoredPollingActive => WebhookResponse::ok(
            "ignored",
            "Webhook ignored: polling mode is active",
        ),
        WebhookOutcome::Completed(SyncOutcome::Updated {
            revision,
            recipients,
        }) => WebhookResponse {
            revision: Some(revision),
            recipients: Some(recipients),
            ..WebhookResponse::ok("refreshed", "Datafile refreshed")
        },
        WebhookOutcome::Completed(SyncOutcome::Unchanged { revision }) => WebhookResponse {
            revision: Some(revision),
            ..WebhookResponse::ok("unchanged", "Datafile revision unchanged")
        },
        WebhookOutcome::Completed(SyncOutcome::InFlight) => {
            WebhookResponse::ok("in_flight", "Refresh already in progress")
        }
        WebhookOutcome::Failed(reason) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(WebhookResponse {
                    success: false,
                    message: format!("Datafile refresh failed: {}", reason),
                    outcome: "failed",
                    revision: None,
                    recipients: None,
                }),
            );
        }
    };
    (StatusCode::OK, Json(response))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/datafileUpdated", post(datafile_updated))
}
