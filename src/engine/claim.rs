//! Batch claim submission.
//!
//! A [`Selection`] is the caller's view state for one grid. Submitting it
//! dispatches one independent claim per square; squares that succeed stay
//! claimed even when siblings fail, and the [`ClaimReport`] lists both.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info};

use crate::domain::{ClaimState, Coordinate, GridId, Owner};
use crate::error::{PoolError, Result};

/// Squares picked for one submission. Never holds more than `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    grid_id: GridId,
    limit: u32,
    squares: Vec<Coordinate>,
}

impl Selection {
    pub fn new(grid_id: GridId, limit: u32) -> Self {
        Self {
            grid_id,
            limit,
            squares: Vec::new(),
        }
    }

    /// Build a selection from a request, rejecting it whole if it would
    /// exceed the limit
    pub fn from_squares(
        grid_id: GridId,
        limit: u32,
        squares: impl IntoIterator<Item = Coordinate>,
    ) -> Result<Self> {
        let mut selection = Self::new(grid_id, limit);
        for coord in squares {
            if !selection.contains(coord) {
                selection.add(coord)?;
            }
        }
        Ok(selection)
    }

    pub fn grid_id(&self) -> GridId {
        self.grid_id
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn squares(&self) -> &[Coordinate] {
        &self.squares
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.squares.contains(&coord)
    }

    fn add(&mut self, coord: Coordinate) -> Result<()> {
        if self.squares.len() as u32 >= self.limit {
            return Err(PoolError::LimitExceeded { limit: self.limit });
        }
        self.squares.push(coord);
        Ok(())
    }

    /// Select or deselect a square. Returns whether it is now selected.
    /// Going over the limit fails and leaves the selection untouched.
    pub fn toggle(&mut self, coord: Coordinate) -> Result<bool> {
        if let Some(pos) = self.squares.iter().position(|c| *c == coord) {
            self.squares.remove(pos);
            return Ok(false);
        }
        self.add(coord)?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.squares.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareError {
    pub row: u8,
    pub col: u8,
    pub message: String,
    pub error_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    pub success_count: usize,
    pub claimed: Vec<Coordinate>,
    pub errors: Vec<SquareError>,
    pub state: ClaimState,
}

/// What the claimant typed in
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimantInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub player_name: Option<String>,
}

impl ClaimantInput {
    pub fn owner(&self) -> Result<Owner> {
        Owner::new(&self.name, &self.email, self.player_name.as_deref())
    }
}

pub struct ClaimWorkflow {
    state: ClaimState,
    selection: Selection,
}

impl ClaimWorkflow {
    pub fn new(selection: Selection) -> Self {
        Self {
            state: ClaimState::Selecting,
            selection,
        }
    }

    pub fn state(&self) -> ClaimState {
        self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> Result<&mut Selection> {
        if self.state != ClaimState::Selecting {
            return Err(PoolError::validation("Submission already in progress"));
        }
        Ok(&mut self.selection)
    }

    fn transition(&mut self, target: ClaimState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(PoolError::Internal(format!(
                "Invalid claim transition: {} -> {}",
                self.state, target
            )));
        }
        debug!("Claim workflow: {} -> {}", self.state, target);
        self.state = target;
        Ok(())
    }

    /// Start over with an empty selection after a submission finished
    pub fn restart(&mut self) -> Result<()> {
        self.transition(ClaimState::Selecting)?;
        self.selection.clear();
        Ok(())
    }

    /// Validate the claimant, then run `claim_one` for every selected square
    /// concurrently. Validation failures move straight to `Failed` without
    /// touching any square.
    pub async fn submit<F, Fut>(
        &mut self,
        claimant: &ClaimantInput,
        claim_one: F,
    ) -> Result<ClaimReport>
    where
        F: Fn(Coordinate, Owner) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let owner = match self.validate(claimant) {
            Ok(owner) => owner,
            Err(e) => {
                self.transition(ClaimState::Failed)?;
                return Err(e);
            }
        };
        self.transition(ClaimState::Submitting)?;

        let squares = self.selection.squares().to_vec();
        let results = join_all(
            squares
                .iter()
                .map(|coord| claim_one(*coord, owner.clone())),
        )
        .await;

        let mut claimed = Vec::new();
        let mut errors = Vec::new();
        for (coord, result) in squares.iter().zip(results) {
            match result {
                Ok(()) => claimed.push(*coord),
                Err(e) => errors.push(SquareError {
                    row: coord.row(),
                    col: coord.col(),
                    message: e.to_string(),
                    error_type: e.kind().as_str().to_string(),
                }),
            }
        }

        let target = if errors.is_empty() {
            ClaimState::Succeeded
        } else if claimed.is_empty() {
            ClaimState::Failed
        } else {
            ClaimState::PartiallySucceeded
        };
        self.transition(target)?;

        info!(
            "Grid {}: {} claimed {}/{} squares",
            self.selection.grid_id(),
            owner.email,
            claimed.len(),
            squares.len()
        );

        Ok(ClaimReport {
            success_count: claimed.len(),
            claimed,
            errors,
            state: target,
        })
    }

    fn validate(&self, claimant: &ClaimantInput) -> Result<Owner> {
        if self.selection.is_empty() {
            return Err(PoolError::validation("Please select at least one square"));
        }
        claimant.owner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(row: i64, col: i64) -> Coordinate {
        Coordinate::new(row, col).unwrap()
    }

    fn claimant() -> ClaimantInput {
        ClaimantInput {
            name: "Pat".into(),
            email: "Pat@Example.com".into(),
            player_name: None,
        }
    }

    #[test]
    fn test_sixth_square_rejected_without_change() {
        let mut selection = Selection::new(1, 5);
        for col in 0..5 {
            assert!(selection.toggle(at(0, col)).unwrap());
        }
        let before = selection.clone();
        assert!(matches!(
            selection.toggle(at(0, 5)),
            Err(PoolError::LimitExceeded { limit: 5 })
        ));
        assert_eq!(selection, before);
    }

    #[test]
    fn test_toggle_deselects() {
        let mut selection = Selection::new(1, 1);
        selection.toggle(at(3, 3)).unwrap();
        assert!(!selection.toggle(at(3, 3)).unwrap());
        assert!(selection.toggle(at(4, 4)).unwrap());
    }

    #[test]
    fn test_from_squares_dedups_and_enforces_limit() {
        let sel = Selection::from_squares(1, 2, [at(1, 1), at(1, 1), at(1, 2)]).unwrap();
        assert_eq!(sel.len(), 2);
        assert!(Selection::from_squares(1, 2, [at(1, 1), at(1, 2), at(1, 3)]).is_err());
    }

    #[tokio::test]
    async fn test_partial_success_reported() {
        let selection = Selection::from_squares(1, 5, [at(0, 0), at(0, 1), at(0, 2)]).unwrap();
        let mut workflow = ClaimWorkflow::new(selection);

        let report = workflow
            .submit(&claimant(), |coord, owner| async move {
                assert_eq!(owner.email, "pat@example.com");
                if coord.col() == 1 {
                    Err(PoolError::AlreadyClaimed)
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(report.success_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!((report.errors[0].row, report.errors[0].col), (0, 1));
        assert_eq!(report.errors[0].error_type, "conflict");
        assert_eq!(report.state, ClaimState::PartiallySucceeded);
        assert_eq!(workflow.state(), ClaimState::PartiallySucceeded);
    }

    #[tokio::test]
    async fn test_invalid_claimant_touches_nothing() {
        let calls = AtomicUsize::new(0);
        let selection = Selection::from_squares(1, 5, [at(0, 0)]).unwrap();
        let mut workflow = ClaimWorkflow::new(selection);
        let bad = ClaimantInput {
            name: "Pat".into(),
            email: "not-an-email".into(),
            player_name: None,
        };

        let err = workflow
            .submit(&bad, |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::InvalidEmail));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(workflow.state(), ClaimState::Failed);
    }

    #[tokio::test]
    async fn test_all_failed_and_restart() {
        let selection = Selection::from_squares(1, 5, [at(9, 9)]).unwrap();
        let mut workflow = ClaimWorkflow::new(selection);
        let report = workflow
            .submit(&claimant(), |_, _| async { Err(PoolError::NumbersLocked) })
            .await
            .unwrap();
        assert_eq!(report.state, ClaimState::Failed);

        workflow.restart().unwrap();
        assert_eq!(workflow.state(), ClaimState::Selecting);
        assert!(workflow.selection().is_empty());
    }
}
