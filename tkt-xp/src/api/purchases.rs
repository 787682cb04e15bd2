//! Purchase recording endpoint
//!
//! Called by the order-completion path once per completed order with the
//! categories of the seats sold.

use super::parse_user_id;
use crate::attributes::Category;
use crate::{ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub user_id: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    /// Known categories in the request
    pub recorded: usize,
    /// Categories that were not already interests
    pub added: usize,
    pub interests: Vec<Category>,
}

/// POST /purchases
pub async fn record_purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<Json<PurchaseResponse>> {
    let user_id = parse_user_id(&request.user_id)?;

    let mut recorded = 0;
    let mut added = 0;
    for name in &request.categories {
        let Some(category) = Category::from_str(name) else {
            warn!(user_id = %user_id, category = %name, "Skipping unknown purchase category");
            continue;
        };
        recorded += 1;
        if state.attributes.record_purchase(&user_id, category) {
            added += 1;
        }
    }

    let interests: Vec<Category> = state.attributes.interests_of(&user_id).into_iter().collect();
    info!(
        user_id = %user_id,
        recorded,
        added,
        interests = interests.len(),
        "Recorded purchase"
    );

    Ok(Json(PurchaseResponse {
        success: true,
        recorded,
        added,
        interests,
    }))
}

pub fn purchase_routes() -> Router<AppState> {
    Router::new().route("/purchases", post(record_purchase))
}
