use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Coordinate, GridId};

/// Actor recorded on every administrative entry
pub const ADMIN_ACTOR: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateGrid,
    DeleteGrid,
    ResetGrid,
    ClaimSquare,
    ClearSquare,
    RandomizeNumbers,
    ClearNumbers,
    LockNumbers,
    UpdateConfig,
    UpdateScores,
    LiveSync,
    EnableLiveSync,
    DisableLiveSync,
    LockQuarter,
    UnlockQuarter,
    MarkPaid,
    MarkUnpaid,
    BulkMarkPaid,
    UpdatePlayerName,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateGrid => "create_grid",
            AuditAction::DeleteGrid => "delete_grid",
            AuditAction::ResetGrid => "reset_grid",
            AuditAction::ClaimSquare => "claim_square",
            AuditAction::ClearSquare => "clear_square",
            AuditAction::RandomizeNumbers => "randomize_numbers",
            AuditAction::ClearNumbers => "clear_numbers",
            AuditAction::LockNumbers => "lock_numbers",
            AuditAction::UpdateConfig => "update_config",
            AuditAction::UpdateScores => "update_scores",
            AuditAction::LiveSync => "live_sync",
            AuditAction::EnableLiveSync => "enable_live_sync",
            AuditAction::DisableLiveSync => "disable_live_sync",
            AuditAction::LockQuarter => "lock_quarter",
            AuditAction::UnlockQuarter => "unlock_quarter",
            AuditAction::MarkPaid => "mark_paid",
            AuditAction::MarkUnpaid => "mark_unpaid",
            AuditAction::BulkMarkPaid => "bulk_mark_paid",
            AuditAction::UpdatePlayerName => "update_player_name",
        }
    }

    const ALL: [AuditAction; 19] = [
        AuditAction::CreateGrid,
        AuditAction::DeleteGrid,
        AuditAction::ResetGrid,
        AuditAction::ClaimSquare,
        AuditAction::ClearSquare,
        AuditAction::RandomizeNumbers,
        AuditAction::ClearNumbers,
        AuditAction::LockNumbers,
        AuditAction::UpdateConfig,
        AuditAction::UpdateScores,
        AuditAction::LiveSync,
        AuditAction::EnableLiveSync,
        AuditAction::DisableLiveSync,
        AuditAction::LockQuarter,
        AuditAction::UnlockQuarter,
        AuditAction::MarkPaid,
        AuditAction::MarkUnpaid,
        AuditAction::BulkMarkPaid,
        AuditAction::UpdatePlayerName,
    ];
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AuditAction {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let wanted = s.trim().to_lowercase();
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("Unknown audit action: {}", s))
    }
}

/// Immutable record of an administrative action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: String,
    pub target_email: Option<String>,
    pub grid_id: Option<GridId>,
    pub row: Option<u8>,
    pub col: Option<u8>,
    pub details: String,
    /// False for attempts that were rejected
    pub succeeded: bool,
}

/// Entry about to be appended; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub target_email: Option<String>,
    pub grid_id: Option<GridId>,
    pub square: Option<Coordinate>,
    pub details: String,
    pub succeeded: bool,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            action,
            target_email: None,
            grid_id: None,
            square: None,
            details: details.into(),
            succeeded: true,
        }
    }

    pub fn grid(mut self, grid_id: GridId) -> Self {
        self.grid_id = Some(grid_id);
        self
    }

    pub fn square(mut self, coord: Coordinate) -> Self {
        self.square = Some(coord);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.target_email = Some(email.into());
        self
    }

    /// Turn into a record of a rejected attempt
    pub fn rejected(mut self, reason: impl fmt::Display) -> Self {
        self.succeeded = false;
        self.details = format!("rejected: {} ({})", reason, self.details);
        self
    }

    pub fn into_entry(self, id: i64, timestamp: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            timestamp,
            action: self.action,
            actor: ADMIN_ACTOR.to_string(),
            target_email: self.target_email,
            grid_id: self.grid_id,
            row: self.square.map(|c| c.row()),
            col: self.square.map(|c| c.col()),
            details: self.details,
            succeeded: self.succeeded,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub email: Option<String>,
    pub grid_id: Option<GridId>,
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_audit_limit() -> usize {
    50
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action: None,
            email: None,
            grid_id: None,
            limit: default_audit_limit(),
            offset: 0,
        }
    }
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.map_or(true, |a| a == entry.action)
            && self.grid_id.map_or(true, |g| Some(g) == entry.grid_id)
            && self.email.as_deref().map_or(true, |e| {
                entry
                    .target_email
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(e))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: usize,
}
