use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};

use crate::api::{
    auth::{
        build_admin_logout_cookie, build_admin_session_cookie, ensure_admin_authorized,
        is_valid_admin_token,
    },
    error::{ApiError, ApiResult},
    state::AppState,
    types::*,
};

/// GET /health -- liveness plus a store round-trip
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let store = match state.service.list_grids().await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };
    let ok = store == "connected";
    let resp = HealthResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        store: store.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    };
    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}

/// GET /api/admin/status
pub async fn get_auth_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<AuthStatusResponse> {
    let authenticated = ensure_admin_authorized(&headers, &state.admin).is_ok();
    Ok(Json(AuthStatusResponse {
        authenticated,
        auth_required: state.admin.auth_required,
    }))
}

fn cookie_headers(cookie: &str) -> std::result::Result<HeaderMap, ApiError> {
    let value = HeaderValue::from_str(cookie).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to build auth cookie: {}", e),
            "internal",
        )
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value);
    Ok(headers)
}

/// POST /api/admin/login
pub async fn login_admin(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> std::result::Result<(HeaderMap, Json<SuccessResponse>), ApiError> {
    if req.admin_token.trim().is_empty() {
        return Err(ApiError::bad_request("admin_token is required"));
    }
    let Some(expected) = state.admin.expected_token() else {
        if !state.admin.auth_required {
            return Ok((HeaderMap::new(), Json(SuccessResponse::ok())));
        }
        return Err(ApiError::from((
            StatusCode::SERVICE_UNAVAILABLE,
            "admin auth is required but SQUARES__ADMIN__TOKEN is not configured".to_string(),
        )));
    };
    if !is_valid_admin_token(&state.admin, &req.admin_token) {
        return Err(ApiError::from((
            StatusCode::UNAUTHORIZED,
            "admin auth failed (missing/invalid token)".to_string(),
        )));
    }

    let headers = cookie_headers(&build_admin_session_cookie(&state.admin, expected))?;
    Ok((headers, Json(SuccessResponse::ok())))
}

/// POST /api/admin/logout
pub async fn logout_admin(
    State(state): State<AppState>,
) -> std::result::Result<(HeaderMap, Json<SuccessResponse>), ApiError> {
    let headers = cookie_headers(&build_admin_logout_cookie(&state.admin))?;
    Ok((headers, Json(SuccessResponse::ok())))
}
