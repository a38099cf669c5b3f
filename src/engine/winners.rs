//! Quarter winner resolution.
//!
//! Pure function of the digit draw, the quarter scores and current square
//! ownership. Same inputs always give the same board.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Coordinate, NumberAssignment, PrizeSplit, Quarter, Scores, Square};

pub const UNCLAIMED: &str = "Unclaimed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterWinner {
    pub quarter: Quarter,
    pub label: String,
    pub team1_score: u32,
    pub team2_score: u32,
    pub coord: Coordinate,
    pub winner_name: String,
    pub player_name: Option<String>,
    /// Filled in once the board is priced
    pub payout: Option<Decimal>,
}

/// How many quarters one cell has won
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWins {
    pub coord: Coordinate,
    pub winner_name: String,
    pub wins: u32,
    pub quarters: Vec<Quarter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerBoard {
    /// One entry per resolved quarter, Q1 first; repeat winners repeat
    pub entries: Vec<QuarterWinner>,
    /// Most wins first
    pub win_counts: Vec<CellWins>,
}

/// Cell for a score pair: column from team1's last digit, row from team2's
pub fn winning_cell(numbers: &NumberAssignment, team1: u32, team2: u32) -> Option<Coordinate> {
    let col = numbers.col_numbers.position_of((team1 % 10) as u8)?;
    let row = numbers.row_numbers.position_of((team2 % 10) as u8)?;
    Coordinate::new(row as i64, col as i64).ok()
}

pub fn resolve(
    numbers: Option<&NumberAssignment>,
    scores: &Scores,
    squares: &[Square],
) -> WinnerBoard {
    let Some(numbers) = numbers else {
        return WinnerBoard::default();
    };

    let entries: Vec<QuarterWinner> = Quarter::ALL
        .into_iter()
        .filter_map(|quarter| {
            let (team1, team2) = scores.get(quarter).pair()?;
            let coord = winning_cell(numbers, team1, team2)?;
            let claim = squares
                .iter()
                .find(|s| s.coord == coord)
                .and_then(|s| s.claim.as_ref());
            Some(QuarterWinner {
                quarter,
                label: quarter.label().to_string(),
                team1_score: team1,
                team2_score: team2,
                coord,
                winner_name: claim
                    .map(|c| c.owner.name.clone())
                    .unwrap_or_else(|| UNCLAIMED.to_string()),
                player_name: claim.and_then(|c| c.owner.player_name.clone()),
                payout: None,
            })
        })
        .collect();

    let mut win_counts: Vec<CellWins> = Vec::new();
    for entry in &entries {
        match win_counts.iter_mut().find(|c| c.coord == entry.coord) {
            Some(cell) => {
                cell.wins += 1;
                cell.quarters.push(entry.quarter);
            }
            None => win_counts.push(CellWins {
                coord: entry.coord,
                winner_name: entry.winner_name.clone(),
                wins: 1,
                quarters: vec![entry.quarter],
            }),
        }
    }
    // stable sort keeps first-won order among ties
    win_counts.sort_by(|a, b| b.wins.cmp(&a.wins));

    WinnerBoard {
        entries,
        win_counts,
    }
}

impl WinnerBoard {
    /// Attach each quarter's share of `pot`
    pub fn priced(mut self, prizes: &PrizeSplit, pot: Decimal) -> Self {
        for entry in &mut self.entries {
            entry.payout = Some(prizes.payout(entry.quarter, pot));
        }
        self
    }
}
