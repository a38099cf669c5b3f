//! Grid-level state changes.
//!
//! Stores apply a [`GridMutation`] inside their own critical section
//! (entry lock or `SELECT ... FOR UPDATE`), so every check-then-set here is
//! atomic with respect to other mutations of the same grid.

use crate::domain::{
    ConfigPatch, GridState, LockPolicy, NumberAssignment, Quarter, QuarterLocks, Scores,
    ScoresPatch,
};
use crate::error::{PoolError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum GridMutation {
    Configure(ConfigPatch),
    /// Manual admin entry; touching a locked quarter fails
    SaveScores(ScoresPatch),
    /// Live sync commit; locked quarters are skipped
    SyncScores(ScoresPatch),
    AssignNumbers(NumberAssignment),
    ClearNumbers,
    LockNumbers,
    SetQuarterLock { quarter: Quarter, locked: bool },
    SetLiveSync(bool),
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Whether persisted state differs from before
    pub changed: bool,
    /// Quarters whose scores changed
    pub quarters: Vec<Quarter>,
    /// Every claim in the grid must be dropped along with this change
    pub clears_squares: bool,
}

impl MutationOutcome {
    fn changed(changed: bool) -> Self {
        Self {
            changed,
            ..Default::default()
        }
    }
}

impl GridMutation {
    pub fn apply(&self, state: &mut GridState) -> Result<MutationOutcome> {
        match self {
            GridMutation::Configure(patch) => patch.apply(state).map(MutationOutcome::changed),
            GridMutation::SaveScores(patch) | GridMutation::SyncScores(patch) => {
                let policy = match self {
                    GridMutation::SaveScores(_) => LockPolicy::Reject,
                    _ => LockPolicy::Skip,
                };
                let quarters =
                    patch.apply(&mut state.settings.scores, &state.settings.quarter_locks, policy)?;
                Ok(MutationOutcome {
                    changed: !quarters.is_empty(),
                    quarters,
                    clears_squares: false,
                })
            }
            GridMutation::AssignNumbers(numbers) => {
                if state.grid.numbers_locked {
                    return Err(PoolError::NumbersLocked);
                }
                state.grid.numbers = Some(*numbers);
                Ok(MutationOutcome::changed(true))
            }
            GridMutation::ClearNumbers => {
                if state.grid.numbers_locked {
                    return Err(PoolError::NumbersLocked);
                }
                Ok(MutationOutcome::changed(state.grid.numbers.take().is_some()))
            }
            GridMutation::LockNumbers => {
                if state.grid.numbers_locked {
                    return Err(PoolError::NumbersLocked);
                }
                if state.grid.numbers.is_none() {
                    return Err(PoolError::NumbersNotAssigned);
                }
                state.grid.numbers_locked = true;
                Ok(MutationOutcome::changed(true))
            }
            GridMutation::SetQuarterLock { quarter, locked } => {
                let previous = state.settings.quarter_locks.set(*quarter, *locked);
                Ok(MutationOutcome::changed(previous != *locked))
            }
            GridMutation::SetLiveSync(enabled) => {
                let previous = std::mem::replace(&mut state.settings.live_sync_enabled, *enabled);
                Ok(MutationOutcome::changed(previous != *enabled))
            }
            GridMutation::Reset => {
                state.grid.numbers = None;
                state.grid.numbers_locked = false;
                state.settings.scores = Scores::default();
                state.settings.quarter_locks = QuarterLocks::default();
                Ok(MutationOutcome {
                    changed: true,
                    quarters: Vec::new(),
                    clears_squares: true,
                })
            }
        }
    }
}
