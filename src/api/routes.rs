use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // Public grid endpoints
        .route("/api/grids", get(handlers::list_grids))
        .route("/api/grids/:id", get(handlers::get_grid))
        .route("/api/grids/:id/winners", get(handlers::get_winners))
        .route("/api/grids/:id/claim", post(handlers::claim_square))
        .route("/api/grids/:id/claims", post(handlers::claim_squares))
        .route("/api/grids/:id/live", get(handlers::get_live_scores))
        .route("/api/my-squares", get(handlers::my_squares))
        // Admin session
        .route("/api/admin/login", post(handlers::login_admin))
        .route("/api/admin/logout", post(handlers::logout_admin))
        .route("/api/admin/status", get(handlers::get_auth_status))
        // Admin grid endpoints
        .route("/api/admin/grids", post(handlers::create_grid))
        .route("/api/admin/grids/:id", delete(handlers::delete_grid))
        .route("/api/admin/grids/:id/reset", post(handlers::reset_grid))
        .route(
            "/api/admin/grids/:id/clear-square",
            post(handlers::clear_square),
        )
        .route(
            "/api/admin/grids/:id/randomize",
            post(handlers::randomize_numbers),
        )
        .route(
            "/api/admin/grids/:id/clear-numbers",
            post(handlers::clear_numbers),
        )
        .route(
            "/api/admin/grids/:id/lock-numbers",
            post(handlers::lock_numbers),
        )
        .route("/api/admin/grids/:id/config", post(handlers::save_config))
        .route("/api/admin/grids/:id/scores", post(handlers::save_scores))
        .route(
            "/api/admin/grids/:id/quarters",
            post(handlers::set_quarter_lock),
        )
        // Ledger endpoints
        .route(
            "/api/admin/grids/:id/participants",
            get(handlers::get_participants),
        )
        .route(
            "/api/admin/grids/:id/participants/paid",
            post(handlers::toggle_paid),
        )
        .route(
            "/api/admin/grids/:id/participants/bulk-paid",
            post(handlers::bulk_mark_paid),
        )
        .route(
            "/api/admin/grids/:id/participants/player-name",
            post(handlers::update_player_name),
        )
        .route("/api/admin/player-totals", get(handlers::get_player_totals))
        .route("/api/admin/audit", get(handlers::get_audit_log))
        // Live score endpoints
        .route(
            "/api/admin/grids/:id/live/sync",
            post(handlers::sync_live_scores),
        )
        .route(
            "/api/admin/grids/:id/live/auto",
            post(handlers::set_auto_sync),
        )
        .route(
            "/api/admin/grids/:id/live/resync",
            post(handlers::resync_live_scores),
        )
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
