use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::api::{
    auth::ensure_admin_authorized,
    error::ApiResult,
    state::AppState,
    types::*,
};
use crate::domain::{AuditPage, AuditQuery, GridId};
use crate::engine::{ParticipantPage, ParticipantQuery, PlayerTotal};
use crate::services::BulkPaidReport;

/// GET /api/admin/grids/:id/participants
pub async fn get_participants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Query(query): Query<ParticipantQuery>,
) -> ApiResult<ParticipantPage> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.participants(&admin, id, &query).await?))
}

/// POST /api/admin/grids/:id/participants/paid
pub async fn toggle_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<PaidRequest>,
) -> ApiResult<UpdatedSquaresResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    let squares_updated = state
        .service
        .toggle_paid(&admin, id, &req.email, req.paid)
        .await?;
    Ok(Json(UpdatedSquaresResponse { squares_updated }))
}

/// POST /api/admin/grids/:id/participants/bulk-paid
pub async fn bulk_mark_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<BulkPaidRequest>,
) -> ApiResult<BulkPaidReport> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(
        state
            .service
            .bulk_mark_paid(&admin, id, &req.emails, req.paid)
            .await?,
    ))
}

/// POST /api/admin/grids/:id/participants/player-name
pub async fn update_player_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<PlayerNameRequest>,
) -> ApiResult<UpdatedSquaresResponse> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    let squares_updated = state
        .service
        .update_player_name(&admin, id, &req.email, req.player_name.as_deref())
        .await?;
    Ok(Json(UpdatedSquaresResponse { squares_updated }))
}

/// GET /api/admin/player-totals
pub async fn get_player_totals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<PlayerTotal>> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.player_totals(&admin).await?))
}

/// GET /api/admin/audit
pub async fn get_audit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult<AuditPage> {
    let admin = ensure_admin_authorized(&headers, &state.admin)?;
    Ok(Json(state.service.audit_log(&admin, &query).await?))
}
