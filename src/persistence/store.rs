//! Storage interface for the pool.
//!
//! Decouples services from a concrete backend so they can run against
//! [`crate::adapters::MemoryStore`] in tests and
//! [`crate::adapters::PostgresStore`] in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuditEntry, AuditPage, AuditQuery, Claim, ClaimFilter, ClaimGate, ClaimedSquare, Coordinate,
    GridDefaults, GridId, GridMutation, GridState, GridSummary, MutationOutcome, NewAuditEntry,
    Square,
};
use crate::error::Result;

#[async_trait]
pub trait PoolStore: Send + Sync {
    // --- Grids ---
    /// All grids ordered by id
    async fn list_grids(&self) -> Result<Vec<GridSummary>>;
    async fn get_grid(&self, id: GridId) -> Result<GridState>;
    /// Creates the grid together with its 100 unclaimed squares
    async fn create_grid(
        &self,
        name: Option<&str>,
        defaults: &GridDefaults,
        now: DateTime<Utc>,
    ) -> Result<GridState>;
    /// Removes the grid and all of its squares
    async fn delete_grid(&self, id: GridId) -> Result<()>;
    /// Applies `mutation` atomically with respect to other mutations of the
    /// same grid. Nothing is written when the mutation fails.
    async fn mutate_grid(
        &self,
        id: GridId,
        mutation: &GridMutation,
    ) -> Result<(GridState, MutationOutcome)>;

    // --- Squares ---
    /// All 100 squares in row-major order
    async fn list_squares(&self, grid_id: GridId) -> Result<Vec<Square>>;
    /// Compare-and-set on "square has no owner". A lost race fails with
    /// `AlreadyClaimed` immediately instead of waiting. `gate` is checked
    /// against the grid in the same step, so a lock that commits first wins.
    async fn claim_square(
        &self,
        grid_id: GridId,
        coord: Coordinate,
        claim: &Claim,
        gate: ClaimGate,
    ) -> Result<()>;
    /// Returns the claim that was removed, or `NotClaimed`
    async fn clear_square(&self, grid_id: GridId, coord: Coordinate) -> Result<Claim>;
    async fn count_claims_by_email(&self, grid_id: GridId, email: &str) -> Result<u32>;
    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<ClaimedSquare>>;

    // --- Payments ---
    /// Sets `paid` on every square the email owns in the grid in one step.
    /// Returns the number of squares owned.
    async fn set_paid(&self, grid_id: GridId, email: &str, paid: bool) -> Result<u32>;
    async fn set_player_name(
        &self,
        grid_id: GridId,
        email: &str,
        player_name: Option<&str>,
    ) -> Result<u32>;

    // --- Audit ---
    async fn append_audit(&self, entry: NewAuditEntry, at: DateTime<Utc>) -> Result<AuditEntry>;
    /// Newest first
    async fn list_audit(&self, query: &AuditQuery) -> Result<AuditPage>;
}
