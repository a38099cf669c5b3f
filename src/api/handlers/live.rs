use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::api::{
    auth::ensure_admin_authorized,
    error::ApiResult,
    state::AppState,
    types::*,
};
use crate::domain::GridId;
use crate::services::{LiveFetchResult, SyncReport};

/// GET /api/grids/:id/live
///
/// Feed failures are reported in the body next to the cached scores.
pub async fn get_live_scores(
    State(state): State<AppState>,
    Path(id): Path<GridId>,
) -> ApiResult<LiveFetchResult> {
    Ok(Json(state.live.fetch_live(id).await?))
}

/// POST /api/admin/grids/:id/live/sync
pub async fn sync_live_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<SyncReport> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.live.sync_live_scores(&admin, id).await?))
}

/// POST /api/admin/grids/:id/live/auto
pub async fn set_auto_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<AutoSyncRequest>,
) -> ApiResult<AutoSyncResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    if req.enabled {
        state.live.start_auto(&admin, id).await?;
    } else {
        state.live.stop_auto(&admin, id).await?;
    }
    Ok(Json(AutoSyncResponse {
        live_sync_enabled: req.enabled,
    }))
}

/// POST /api/admin/grids/:id/live/resync
pub async fn resync_live_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<LiveFetchResult> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.live.resync(&admin, id).await?))
}
