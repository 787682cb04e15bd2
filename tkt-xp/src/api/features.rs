//! Decision query endpoint

use super::{missing_user_id, parse_user_id, DeviceQuery};
use crate::decision::Decision;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesResponse {
    pub user_id: String,
    pub revision: String,
    pub features: BTreeMap<String, Decision>,
}

/// GET /features/:user_id?operating_system=
///
/// Decisions for every known experiment and every experiment in the active
/// datafile, all taken against the same snapshot.
pub async fn get_features(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(device): Query<DeviceQuery>,
) -> ApiResult<Json<FeaturesResponse>> {
    let user_id = parse_user_id(&user_id)?;
    let os = device.operating_system();

    let decisions = state.resolver.decide_all(&user_id, os);
    debug!(
        user_id = %user_id,
        operating_system = os,
        revision = %decisions.revision,
        "Resolved features"
    );

    Ok(Json(FeaturesResponse {
        user_id: decisions.user_id.to_string(),
        revision: decisions.revision,
        features: decisions.decisions,
    }))
}

pub fn feature_routes() -> Router<AppState> {
    Router::new()
        .route("/features/", get(missing_user_id))
        .route("/features/:user_id", get(get_features))
}
