use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FeedError;

/// Why the last live fetch produced no game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    NotFoundYet,
    OtherError,
}

impl From<&FeedError> for UnavailableReason {
    fn from(err: &FeedError) -> Self {
        match err {
            FeedError::NotFoundYet => UnavailableReason::NotFoundYet,
            FeedError::Other(_) => UnavailableReason::OtherError,
        }
    }
}

/// Live score sync state machine states (per grid)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SyncState {
    /// Nothing fetched yet
    #[default]
    Idle,
    /// A fetch is outstanding
    Fetching,
    /// Last fetch returned the game
    Available,
    /// Last fetch failed; manual score entry still works
    Unavailable(UnavailableReason),
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "IDLE",
            SyncState::Fetching => "FETCHING",
            SyncState::Available => "AVAILABLE",
            SyncState::Unavailable(UnavailableReason::NotFoundYet) => "UNAVAILABLE_NOT_FOUND_YET",
            SyncState::Unavailable(UnavailableReason::OtherError) => "UNAVAILABLE_OTHER_ERROR",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        use SyncState::*;

        match (self, target) {
            (Idle, Fetching) => true,

            (Fetching, Available) => true,
            (Fetching, Unavailable(_)) => true,
            // Result discarded because sync was disabled mid-flight
            (Fetching, Idle) => true,

            (Available, Fetching) | (Available, Idle) => true,
            (Unavailable(_), Fetching) | (Unavailable(_), Idle) => true,

            _ => false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, SyncState::Unavailable(_))
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claim submission workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Building up the selection set
    Selecting,
    /// Claims dispatched, waiting for per-square results
    Submitting,
    /// Every selected square was claimed
    Succeeded,
    /// Some squares were claimed, some were not
    PartiallySucceeded,
    /// Nothing was claimed
    Failed,
}

impl ClaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Selecting => "SELECTING",
            ClaimState::Submitting => "SUBMITTING",
            ClaimState::Succeeded => "SUCCEEDED",
            ClaimState::PartiallySucceeded => "PARTIALLY_SUCCEEDED",
            ClaimState::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, target: ClaimState) -> bool {
        use ClaimState::*;

        match (self, target) {
            (Selecting, Submitting) => true,
            // Rejected before anything was sent
            (Selecting, Failed) => true,

            (Submitting, Succeeded) | (Submitting, PartiallySucceeded) | (Submitting, Failed) => {
                true
            }

            // Start a fresh selection
            (Succeeded, Selecting) | (PartiallySucceeded, Selecting) | (Failed, Selecting) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClaimState::Succeeded | ClaimState::PartiallySucceeded | ClaimState::Failed
        )
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
