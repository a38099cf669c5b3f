//! Live game snapshot and the quarter sync eligibility rule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Quarter, QuarterLocks, QuarterScore};
use crate::error::FeedError;

/// Coarse game status derived from period/clock/halftime/final flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Halftime,
    Final,
}

impl GameStatus {
    pub fn derive(period: u8, is_halftime: bool, is_final: bool) -> Self {
        if is_final {
            GameStatus::Final
        } else if is_halftime {
            GameStatus::Halftime
        } else if period == 0 {
            GameStatus::Scheduled
        } else {
            GameStatus::InProgress
        }
    }
}

/// Snapshot of one game on the external scoreboard, already oriented so
/// `team1` is the grid's column team and `team2` its row team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveGame {
    pub event_id: String,
    pub team1_name: String,
    pub team2_name: String,
    pub team1_score: u32,
    pub team2_score: u32,
    pub period: u8,
    pub clock: String,
    pub is_halftime: bool,
    pub is_final: bool,
    pub status: GameStatus,
    /// Points scored in each period, in order
    pub team1_periods: Vec<u32>,
    pub team2_periods: Vec<u32>,
}

impl LiveGame {
    /// Whether the feed considers `quarter` finished
    pub fn quarter_complete(&self, quarter: Quarter) -> bool {
        match quarter {
            Quarter::Q1 => self.period > 1,
            Quarter::Q2 => self.period > 2 || self.is_halftime,
            Quarter::Q3 => self.period > 3 || self.is_final,
            Quarter::Q4 => self.is_final,
        }
    }

    /// Cumulative score at the end of `quarter`. The last quarter uses the
    /// final total so overtime counts toward it.
    pub fn score_at(&self, quarter: Quarter) -> Option<QuarterScore> {
        if quarter == Quarter::Q4 {
            return self
                .is_final
                .then(|| QuarterScore::new(self.team1_score, self.team2_score));
        }
        let n = quarter.number() as usize;
        if self.team1_periods.len() < n || self.team2_periods.len() < n {
            return None;
        }
        let team1 = self.team1_periods[..n].iter().sum();
        let team2 = self.team2_periods[..n].iter().sum();
        Some(QuarterScore::new(team1, team2))
    }
}

/// A quarter may be synced when the game has moved past it and an
/// administrator has not locked it.
pub fn sync_eligible(game: &LiveGame, locks: &QuarterLocks, quarter: Quarter) -> bool {
    game.quarter_complete(quarter) && !locks.is_locked(quarter)
}

pub fn eligible_quarters(game: &LiveGame, locks: &QuarterLocks) -> Vec<Quarter> {
    Quarter::ALL
        .into_iter()
        .filter(|q| sync_eligible(game, locks, *q))
        .collect()
}

/// How to find the grid's game on the scoreboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameQuery {
    pub event_id: Option<String>,
    pub team1_name: String,
    pub team2_name: String,
}

/// External score feed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoreFeed: Send + Sync {
    async fn fetch_game(&self, query: &GameQuery) -> std::result::Result<LiveGame, FeedError>;
}


#[cfg(test)]
mod tests {
    use super::test_support::game;
    use super::*;

    #[test]
    fn test_eligibility_by_period() {
        let locks = QuarterLocks::default();
        assert!(eligible_quarters(&game(1, false, false), &locks).is_empty());
        assert_eq!(eligible_quarters(&game(2, false, false), &locks), vec![Quarter::Q1]);
        assert_eq!(
            eligible_quarters(&game(3, false, false), &locks),
            vec![Quarter::Q1, Quarter::Q2]
        );
        assert_eq!(
            eligible_quarters(&game(4, false, false), &locks),
            vec![Quarter::Q1, Quarter::Q2, Quarter::Q3]
        );
        assert_eq!(eligible_quarters(&game(4, false, true), &locks), Quarter::ALL.to_vec());
    }

    #[test]
    fn test_halftime_makes_q2_eligible() {
        let locks = QuarterLocks::default();
        assert_eq!(
            eligible_quarters(&game(2, true, false), &locks),
            vec![Quarter::Q1, Quarter::Q2]
        );
    }

    #[test]
    fn test_locked_quarter_never_eligible() {
        let mut locks = QuarterLocks::default();
        locks.set(Quarter::Q1, true);
        let g = game(4, false, true);
        assert!(!sync_eligible(&g, &locks, Quarter::Q1));
        assert_eq!(
            eligible_quarters(&g, &locks),
            vec![Quarter::Q2, Quarter::Q3, Quarter::Q4]
        );
    }

    #[test]
    fn test_cumulative_scores() {
        let g = game(4, false, true);
        assert_eq!(g.score_at(Quarter::Q1).unwrap().pair(), Some((7, 0)));
        assert_eq!(g.score_at(Quarter::Q2).unwrap().pair(), Some((17, 10)));
        assert_eq!(g.score_at(Quarter::Q3).unwrap().pair(), Some((20, 17)));
        assert_eq!(g.score_at(Quarter::Q4).unwrap().pair(), Some((27, 20)));
        assert!(game(3, false, false).score_at(Quarter::Q4).is_none());
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(GameStatus::derive(0, false, false), GameStatus::Scheduled);
        assert_eq!(GameStatus::derive(2, true, false), GameStatus::Halftime);
        assert_eq!(GameStatus::derive(4, false, true), GameStatus::Final);
        assert_eq!(GameStatus::derive(3, false, false), GameStatus::InProgress);
    }
}
