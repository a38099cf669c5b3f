use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::api::{auth::resolve_caller, error::ApiResult, state::AppState, types::*};
use crate::domain::{Coordinate, GridId, GridSummary};
use crate::engine::{ClaimReport, WinnerBoard};
use crate::error::Result;
use crate::services::{GridView, MySquares};

/// GET /api/grids
pub async fn list_grids(State(state): State<AppState>) -> ApiResult<Vec<GridSummary>> {
    Ok(Json(state.service.list_grids().await?))
}

/// GET /api/grids/:id
pub async fn get_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<GridView> {
    let caller = resolve_caller(&headers, &state.admin);
    Ok(Json(state.service.grid_view(&caller, id).await?))
}

/// GET /api/grids/:id/winners
pub async fn get_winners(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
) -> ApiResult<WinnerBoard> {
    let caller = resolve_caller(&headers, &state.admin);
    Ok(Json(state.service.winners(&caller, id).await?))
}

/// POST /api/grids/:id/claim
pub async fn claim_square(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<SuccessResponse> {
    let caller = resolve_caller(&headers, &state.admin);
    let coord = Coordinate::new(req.row, req.col)?;
    state
        .service
        .claim_square(&caller, id, coord, &req.claimant)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/grids/:id/claims
///
/// Squares are claimed one by one; the report lists each failure.
pub async fn claim_squares(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GridId>,
    Json(req): Json<BatchClaimRequest>,
) -> ApiResult<ClaimReport> {
    let caller = resolve_caller(&headers, &state.admin);
    let squares = req
        .squares
        .iter()
        .map(SquareRef::coordinate)
        .collect::<Result<Vec<_>>>()?;
    let report = state
        .service
        .claim_squares(&caller, id, squares, &req.claimant)
        .await?;
    Ok(Json(report))
}

/// GET /api/my-squares?email=&grid_id=
pub async fn my_squares(
    State(state): State<AppState>,
    Query(query): Query<MySquaresQuery>,
) -> ApiResult<MySquares> {
    Ok(Json(
        state.service.my_squares(&query.email, query.grid_id).await?,
    ))
}
