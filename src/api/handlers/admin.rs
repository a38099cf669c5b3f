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
use crate::domain::{Claim, ConfigPatch, GridId, GridState, NumberAssignment, ScoresPatch};

/// POST /api/admin/grids
pub async fn create_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateGridRequest>>,
) -> ApiResult<GridState> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(
        state.service.create_grid(&admin, req.name.as_deref()).await?,
    ))
}

/// DELETE /api/admin/grids/:id
pub async fn delete_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<SuccessResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    state.service.delete_grid(&admin, id).await?;
    state.live.forget(id);
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/admin/grids/:id/reset
pub async fn reset_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<GridState> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.reset_grid(&admin, id).await?))
}

/// POST /api/admin/grids/:id/clear-square
pub async fn clear_square(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<SquareRef>,
) -> ApiResult<Claim> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    let coord = req.coordinate()?;
    Ok(Json(state.service.clear_square(&admin, id, coord).await?))
}

/// POST /api/admin/grids/:id/randomize
pub async fn randomize_numbers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<NumberAssignment> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.randomize_numbers(&admin, id).await?))
}

/// POST /api/admin/grids/:id/clear-numbers
pub async fn clear_numbers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<SuccessResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    state.service.clear_numbers(&admin, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/admin/grids/:id/lock-numbers
pub async fn lock_numbers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<SuccessResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    state.service.lock_numbers(&admin, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/admin/grids/:id/config
pub async fn save_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(patch): Json<ConfigPatch>,
) -> ApiResult<GridState> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.save_config(&admin, id, patch).await?))
}

/// POST /api/admin/grids/:id/scores
pub async fn save_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(patch): Json<ScoresPatch>,
) -> ApiResult<UpdatedQuartersResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    let updated_quarters = state.service.save_scores(&admin, id, patch).await?;
    Ok(Json(UpdatedQuartersResponse { updated_quarters }))
}

/// POST /api/admin/grids/:id/quarters
pub async fn set_quarter_lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<QuarterLockRequest>,
) -> ApiResult<GridState> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(
        state
            .service
            .set_quarter_lock(&admin, id, req.quarter, req.locked)
            .await?,
    ))
}
