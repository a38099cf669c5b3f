use serde::{Deserialize, Serialize};

use crate::domain::{Coordinate, GridId, Quarter};
use crate::engine::ClaimantInput;
use crate::error::Result;

// ============================================================================
// Claim Types
// ============================================================================

/// Raw cell position as sent by clients; bounds are checked on conversion
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SquareRef {
    pub row: i64,
    pub col: i64,
}

impl SquareRef {
    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::new(self.row, self.col)
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub row: i64,
    pub col: i64,
    #[serde(flatten)]
    pub claimant: ClaimantInput,
}

#[derive(Debug, Deserialize)]
pub struct BatchClaimRequest {
    pub squares: Vec<SquareRef>,
    #[serde(flatten)]
    pub claimant: ClaimantInput,
}

#[derive(Debug, Deserialize)]
pub struct MySquaresQuery {
    pub email: String,
    pub grid_id: Option<GridId>,
}

// ============================================================================
// Admin Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateGridRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuarterLockRequest {
    pub quarter: Quarter,
    pub locked: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaidRequest {
    pub email: String,
    pub paid: bool,
}

fn default_paid() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct BulkPaidRequest {
    pub emails: Vec<String>,
    #[serde(default = "default_paid")]
    pub paid: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlayerNameRequest {
    pub email: String,
    pub player_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AutoSyncRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub admin_token: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedQuartersResponse {
    pub updated_quarters: Vec<Quarter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedSquaresResponse {
    pub squares_updated: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSyncResponse {
    pub live_sync_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub version: String,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub auth_required: bool,
}
