use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Coordinate, GridId};
use crate::error::{PoolError, Result};

/// Lower-case and check an email the way claims expect it
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || !email.contains('.') {
        return Err(PoolError::InvalidEmail);
    }
    Ok(email)
}

/// Person claiming a square
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub email: String,
    pub player_name: Option<String>,
}

impl Owner {
    pub fn new(name: &str, email: &str, player_name: Option<&str>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PoolError::validation("Name and email are required"));
        }
        if email.trim().is_empty() {
            return Err(PoolError::validation("Name and email are required"));
        }
        Ok(Self {
            name: name.to_string(),
            email: normalize_email(email)?,
            player_name: player_name
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

/// Ownership record of a claimed square.
///
/// A square either has a full `Claim` or none at all, so there is no
/// half-claimed state to represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub owner: Owner,
    pub paid: bool,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(owner: Owner, claimed_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            paid: false,
            claimed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Square {
    pub coord: Coordinate,
    pub claim: Option<Claim>,
}

impl Square {
    pub fn unclaimed(coord: Coordinate) -> Self {
        Self { coord, claim: None }
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.owner.name.as_str())
    }
}

/// A claimed square with the grid it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedSquare {
    pub grid_id: GridId,
    pub coord: Coordinate,
    pub claim: Claim,
}

/// Filter for claim listings
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub grid_id: Option<GridId>,
    pub email: Option<String>,
}

impl ClaimFilter {
    pub fn grid(grid_id: GridId) -> Self {
        Self {
            grid_id: Some(grid_id),
            email: None,
        }
    }

    pub fn email(email: impl Into<String>) -> Self {
        Self {
            grid_id: None,
            email: Some(email.into()),
        }
    }

    pub fn matches(&self, square: &ClaimedSquare) -> bool {
        self.grid_id.map_or(true, |id| id == square.grid_id)
            && self
                .email
                .as_deref()
                .map_or(true, |e| e == square.claim.owner.email)
    }
}
