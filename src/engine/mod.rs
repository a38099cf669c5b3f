//! Pure pool logic: number draws, winner resolution, claim submission and
//! participant bookkeeping. Nothing in here touches storage directly.

pub mod claim;
pub mod ledger;
pub mod numbers;
pub mod winners;

pub use claim::{ClaimReport, ClaimWorkflow, ClaimantInput, Selection, SquareError};
pub use ledger::{
    aggregate_participants, page_participants, player_totals, Participant, ParticipantPage,
    ParticipantQuery, PlayerTotal,
};
pub use winners::{resolve, winning_cell, CellWins, QuarterWinner, WinnerBoard, UNCLAIMED};
