//! Participant aggregation over claimed squares.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{ClaimedSquare, Coordinate, GridId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub player_name: Option<String>,
    pub total_squares: u32,
    pub paid_squares: u32,
    pub amount_owed: Decimal,
    pub all_paid: bool,
    pub first_claimed_at: DateTime<Utc>,
    pub squares: Vec<Coordinate>,
}

/// Group a grid's claims by owner email, earliest claimant first
pub fn aggregate_participants(claims: &[ClaimedSquare], price: Decimal) -> Vec<Participant> {
    let mut by_email: BTreeMap<&str, Participant> = BTreeMap::new();
    for square in claims {
        let claim = &square.claim;
        let entry = by_email
            .entry(claim.owner.email.as_str())
            .or_insert_with(|| Participant {
                name: claim.owner.name.clone(),
                email: claim.owner.email.clone(),
                player_name: None,
                total_squares: 0,
                paid_squares: 0,
                amount_owed: Decimal::ZERO,
                all_paid: true,
                first_claimed_at: claim.claimed_at,
                squares: Vec::new(),
            });
        entry.total_squares += 1;
        if claim.paid {
            entry.paid_squares += 1;
        } else {
            entry.amount_owed += price;
            entry.all_paid = false;
        }
        if claim.claimed_at < entry.first_claimed_at {
            entry.first_claimed_at = claim.claimed_at;
            entry.name = claim.owner.name.clone();
        }
        if entry.player_name.is_none() {
            entry.player_name = claim.owner.player_name.clone();
        }
        entry.squares.push(square.coord);
    }

    let mut out: Vec<Participant> = by_email.into_values().collect();
    out.sort_by(|a, b| {
        a.first_claimed_at
            .cmp(&b.first_claimed_at)
            .then_with(|| a.email.cmp(&b.email))
    });
    out
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantQuery {
    /// Case-insensitive match on name, email or player name
    pub search: Option<String>,
    #[serde(default)]
    pub unpaid_only: bool,
    #[serde(default = "default_participant_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_participant_limit() -> usize {
    100
}

impl Default for ParticipantQuery {
    fn default() -> Self {
        Self {
            search: None,
            unpaid_only: false,
            limit: default_participant_limit(),
            offset: 0,
        }
    }
}

impl ParticipantQuery {
    pub fn matches(&self, p: &Participant) -> bool {
        if self.unpaid_only && p.all_paid {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                p.name.to_lowercase().contains(&term)
                    || p.email.contains(&term)
                    || p
                        .player_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPage {
    pub participants: Vec<Participant>,
    pub total: usize,
    pub total_owed: Decimal,
    pub total_collected: Decimal,
}

pub fn page_participants(
    participants: Vec<Participant>,
    query: &ParticipantQuery,
    price: Decimal,
) -> ParticipantPage {
    let matching: Vec<Participant> = participants
        .into_iter()
        .filter(|p| query.matches(p))
        .collect();
    let total_owed = matching.iter().map(|p| p.amount_owed).sum();
    let total_collected = matching
        .iter()
        .map(|p| price * Decimal::from(p.paid_squares))
        .sum();
    ParticipantPage {
        total: matching.len(),
        total_owed,
        total_collected,
        participants: matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect(),
    }
}

/// One person's squares across every grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotal {
    pub email: String,
    pub name: String,
    pub total_squares: u32,
    pub grids: Vec<GridId>,
}

pub fn player_totals(claims: &[ClaimedSquare]) -> Vec<PlayerTotal> {
    let mut by_email: BTreeMap<&str, PlayerTotal> = BTreeMap::new();
    for square in claims {
        let owner = &square.claim.owner;
        let entry = by_email
            .entry(owner.email.as_str())
            .or_insert_with(|| PlayerTotal {
                email: owner.email.clone(),
                name: owner.name.clone(),
                total_squares: 0,
                grids: Vec::new(),
            });
        entry.total_squares += 1;
        if !entry.grids.contains(&square.grid_id) {
            entry.grids.push(square.grid_id);
        }
    }
    let mut out: Vec<PlayerTotal> = by_email.into_values().collect();
    out.sort_by(|a, b| {
        b.total_squares
            .cmp(&a.total_squares)
            .then_with(|| a.email.cmp(&b.email))
    });
    out
}
