//! Homescreen layout endpoint

use super::{missing_user_id, parse_user_id, DeviceQuery};
use crate::homescreen::HomescreenModule;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomescreenResponse {
    pub success: bool,
    pub data: Vec<HomescreenModule>,
    pub variation_key: String,
    pub enabled: bool,
}

/// GET /homescreen/:user_id?operating_system=
///
/// Always answers with a usable module list: an unusable `modules` variable
/// yields the bundled five-module layout.
pub async fn get_homescreen(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(device): Query<DeviceQuery>,
) -> ApiResult<Json<HomescreenResponse>> {
    let user_id = parse_user_id(&user_id)?;
    let homescreen = state
        .resolver
        .decide_homescreen(&user_id, device.operating_system());

    Ok(Json(HomescreenResponse {
        success: true,
        data: homescreen.modules.into_inner(),
        variation_key: homescreen.decision.variation_key,
        enabled: homescreen.decision.enabled,
    }))
}

pub fn homescreen_routes() -> Router<AppState> {
    Router::new()
        .route("/homescreen/", get(missing_user_id))
        .route("/homescreen/:user_id", get(get_homescreen))
}
