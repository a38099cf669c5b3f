use thiserror::Error;

use crate::domain::{GridId, Quarter};

/// Main error type for the squares pool
#[derive(Error, Debug)]
pub enum PoolError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Invalid coordinate: row {row}, col {col} (must be 0-9)")]
    InvalidCoordinate { row: i64, col: i64 },

    #[error("Please enter a valid email")]
    InvalidEmail,

    #[error("This email has already claimed {limit} squares (the maximum allowed)")]
    LimitExceeded { limit: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Conflict errors
    #[error("This square is already taken")]
    AlreadyClaimed,

    #[error("Numbers are locked")]
    NumbersLocked,

    #[error("Live score fetch already in progress for grid {0}")]
    FetchInProgress(GridId),

    // State errors
    #[error("Square is not claimed")]
    NotClaimed,

    #[error("The claim deadline has passed")]
    DeadlinePassed,

    #[error("Numbers have not been assigned yet")]
    NumbersNotAssigned,

    #[error("Grid {0} is protected and cannot be deleted")]
    ProtectedGrid(GridId),

    #[error("{0} is locked; unlock it before changing its scores")]
    QuarterLocked(Quarter),

    // Lookup errors
    #[error("Grid not found: {0}")]
    GridNotFound(GridId),

    #[error("Not found: {0}")]
    NotFound(String),

    // Authorization errors
    #[error("Admin access required")]
    AdminRequired,

    // Upstream errors
    #[error("Live scores unavailable: {0}")]
    Upstream(#[from] FeedError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

/// Coarse error classes used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation
    Validation,
    /// Lost a race or hit an already-applied state; siblings keep going
    Conflict,
    /// Operation not allowed in the current state
    State,
    NotFound,
    Unauthorized,
    /// External score feed is not answering; manual entry still works
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::State => "state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::InvalidCoordinate { .. }
            | PoolError::InvalidEmail
            | PoolError::LimitExceeded { .. }
            | PoolError::Validation(_) => ErrorKind::Validation,
            PoolError::AlreadyClaimed
            | PoolError::NumbersLocked
            | PoolError::FetchInProgress(_) => ErrorKind::Conflict,
            PoolError::NotClaimed
            | PoolError::DeadlinePassed
            | PoolError::NumbersNotAssigned
            | PoolError::ProtectedGrid(_)
            | PoolError::QuarterLocked(_) => ErrorKind::State,
            PoolError::GridNotFound(_) | PoolError::NotFound(_) => ErrorKind::NotFound,
            PoolError::AdminRequired => ErrorKind::Unauthorized,
            PoolError::Upstream(_) => ErrorKind::Upstream,
            _ => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PoolError::Validation(msg.into())
    }
}

/// Failure of a single live score fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The feed answered but the configured game is not on it (yet)
    #[error("game not found on scoreboard")]
    NotFoundYet,

    #[error("score feed request failed: {0}")]
    Other(String),
}

impl FeedError {
    /// Wire tag reported as `error_type`
    pub fn error_type(&self) -> &'static str {
        match self {
            FeedError::NotFoundYet => "game_not_found",
            FeedError::Other(_) => "fetch_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(PoolError::AlreadyClaimed.kind(), ErrorKind::Conflict);
        assert_eq!(
            PoolError::InvalidCoordinate { row: 10, col: 0 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(PoolError::ProtectedGrid(1).kind(), ErrorKind::State);
        assert_eq!(
            PoolError::Upstream(FeedError::NotFoundYet).kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            PoolError::Internal("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_feed_error_tags() {
        assert_eq!(FeedError::NotFoundYet.error_type(), "game_not_found");
        assert_eq!(
            FeedError::Other("timeout".into()).error_type(),
            "fetch_failed"
        );
    }
}
