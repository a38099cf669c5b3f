use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{PoolError, Result};

/// Scoring checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "QuarterInput")]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    /// Chronological order
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn number(&self) -> u8 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Q1 => "q1",
            Quarter::Q2 => "q2",
            Quarter::Q3 => "q3",
            Quarter::Q4 => "q4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4/Final",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

impl TryFrom<u8> for Quarter {
    type Error = PoolError;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Quarter::Q1),
            2 => Ok(Quarter::Q2),
            3 => Ok(Quarter::Q3),
            4 => Ok(Quarter::Q4),
            _ => Err(PoolError::validation(format!("Unknown quarter: {}", n))),
        }
    }
}

impl TryFrom<&str> for Quarter {
    type Error = PoolError;

    fn try_from(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_lowercase();
        let digits = trimmed.strip_prefix('q').unwrap_or(&trimmed);
        digits
            .parse::<u8>()
            .map_err(|_| PoolError::validation(format!("Unknown quarter: {}", s)))
            .and_then(Quarter::try_from)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuarterInput {
    Number(u8),
    Text(String),
}

impl TryFrom<QuarterInput> for Quarter {
    type Error = PoolError;

    fn try_from(input: QuarterInput) -> Result<Self> {
        match input {
            QuarterInput::Number(n) => Quarter::try_from(n),
            QuarterInput::Text(s) => Quarter::try_from(s.as_str()),
        }
    }
}

/// Both teams' score for one quarter; either side may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterScore {
    pub team1: Option<u32>,
    pub team2: Option<u32>,
}

impl QuarterScore {
    pub fn new(team1: u32, team2: u32) -> Self {
        Self {
            team1: Some(team1),
            team2: Some(team2),
        }
    }

    /// Both scores, when the quarter has been played
    pub fn pair(&self) -> Option<(u32, u32)> {
        Some((self.team1?, self.team2?))
    }
}

/// Per-quarter scores, flattened as `{quarter}_{team}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub q1_team1: Option<u32>,
    pub q1_team2: Option<u32>,
    pub q2_team1: Option<u32>,
    pub q2_team2: Option<u32>,
    pub q3_team1: Option<u32>,
    pub q3_team2: Option<u32>,
    pub q4_team1: Option<u32>,
    pub q4_team2: Option<u32>,
}

impl Scores {
    pub fn get(&self, quarter: Quarter) -> QuarterScore {
        let (team1, team2) = match quarter {
            Quarter::Q1 => (self.q1_team1, self.q1_team2),
            Quarter::Q2 => (self.q2_team1, self.q2_team2),
            Quarter::Q3 => (self.q3_team1, self.q3_team2),
            Quarter::Q4 => (self.q4_team1, self.q4_team2),
        };
        QuarterScore { team1, team2 }
    }

    pub fn set(&mut self, quarter: Quarter, score: QuarterScore) {
        let (team1, team2) = match quarter {
            Quarter::Q1 => (&mut self.q1_team1, &mut self.q1_team2),
            Quarter::Q2 => (&mut self.q2_team1, &mut self.q2_team2),
            Quarter::Q3 => (&mut self.q3_team1, &mut self.q3_team2),
            Quarter::Q4 => (&mut self.q4_team1, &mut self.q4_team2),
        };
        *team1 = score.team1;
        *team2 = score.team2;
    }
}

/// Independent per-quarter freeze flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterLocks {
    pub q1: bool,
    pub q2: bool,
    pub q3: bool,
    pub q4: bool,
}

impl QuarterLocks {
    pub fn is_locked(&self, quarter: Quarter) -> bool {
        match quarter {
            Quarter::Q1 => self.q1,
            Quarter::Q2 => self.q2,
            Quarter::Q3 => self.q3,
            Quarter::Q4 => self.q4,
        }
    }

    /// Returns the previous value
    pub fn set(&mut self, quarter: Quarter, locked: bool) -> bool {
        let slot = match quarter {
            Quarter::Q1 => &mut self.q1,
            Quarter::Q2 => &mut self.q2,
            Quarter::Q3 => &mut self.q3,
            Quarter::Q4 => &mut self.q4,
        };
        std::mem::replace(slot, locked)
    }

    pub fn locked(&self) -> Vec<Quarter> {
        Quarter::ALL
            .into_iter()
            .filter(|q| self.is_locked(*q))
            .collect()
    }
}

/// What to do when a patch touches a locked quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    /// Refuse the whole patch
    Reject,
    /// Leave locked quarters as they are and apply the rest
    Skip,
}

/// Field-level score update.
///
/// Outer `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScoresPatch {
    #[serde(default, deserialize_with = "patch_score")]
    pub q1_team1: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q1_team2: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q2_team1: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q2_team2: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q3_team1: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q3_team2: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q4_team1: Option<Option<u32>>,
    #[serde(default, deserialize_with = "patch_score")]
    pub q4_team2: Option<Option<u32>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScore {
    Number(u32),
    Text(String),
}

/// Accepts a number, a numeric string, `""` or `null`
fn patch_score<'de, D>(deserializer: D) -> std::result::Result<Option<Option<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawScore>::deserialize(deserializer)? {
        None => Ok(Some(None)),
        Some(RawScore::Number(n)) => Ok(Some(Some(n))),
        Some(RawScore::Text(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(RawScore::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(|n| Some(Some(n)))
            .map_err(|_| serde::de::Error::custom(format!("invalid score: {}", s))),
    }
}

impl ScoresPatch {
    /// Patch that sets both scores of one quarter
    pub fn quarter(quarter: Quarter, team1: u32, team2: u32) -> Self {
        let mut patch = Self::default();
        patch.insert(quarter, QuarterScore::new(team1, team2));
        patch
    }

    pub fn insert(&mut self, quarter: Quarter, score: QuarterScore) {
        let (team1, team2) = self.slots_mut(quarter);
        *team1 = Some(score.team1);
        *team2 = Some(score.team2);
    }

    fn slots(&self, quarter: Quarter) -> (Option<Option<u32>>, Option<Option<u32>>) {
        match quarter {
            Quarter::Q1 => (self.q1_team1, self.q1_team2),
            Quarter::Q2 => (self.q2_team1, self.q2_team2),
            Quarter::Q3 => (self.q3_team1, self.q3_team2),
            Quarter::Q4 => (self.q4_team1, self.q4_team2),
        }
    }

    fn slots_mut(
        &mut self,
        quarter: Quarter,
    ) -> (&mut Option<Option<u32>>, &mut Option<Option<u32>>) {
        match quarter {
            Quarter::Q1 => (&mut self.q1_team1, &mut self.q1_team2),
            Quarter::Q2 => (&mut self.q2_team1, &mut self.q2_team2),
            Quarter::Q3 => (&mut self.q3_team1, &mut self.q3_team2),
            Quarter::Q4 => (&mut self.q4_team1, &mut self.q4_team2),
        }
    }

    /// Quarters this patch touches at all
    pub fn touched(&self) -> Vec<Quarter> {
        Quarter::ALL
            .into_iter()
            .filter(|q| {
                let (a, b) = self.slots(*q);
                a.is_some() || b.is_some()
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.touched().is_empty()
    }

    /// Apply to `scores`, returning the quarters whose values actually changed
    pub fn apply(
        &self,
        scores: &mut Scores,
        locks: &QuarterLocks,
        policy: LockPolicy,
    ) -> Result<Vec<Quarter>> {
        let touched = self.touched();
        if policy == LockPolicy::Reject {
            if let Some(q) = touched.iter().find(|q| locks.is_locked(**q)) {
                return Err(PoolError::QuarterLocked(*q));
            }
        }

        let mut changed = Vec::new();
        for quarter in touched {
            if locks.is_locked(quarter) {
                continue;
            }
            let current = scores.get(quarter);
            let (team1, team2) = self.slots(quarter);
            let next = QuarterScore {
                team1: team1.unwrap_or(current.team1),
                team2: team2.unwrap_or(current.team2),
            };
            if next != current {
                scores.set(quarter, next);
                changed.push(quarter);
            }
        }
        Ok(changed)
    }
}
