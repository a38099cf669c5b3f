//! In-memory store.
//!
//! Squares live in a `DashMap` keyed by `(grid, row, col)`; a claim is a
//! compare-and-set on that single entry, so claims on distinct squares never
//! coordinate with each other. Grid-wide writes (payments, resets) hold the
//! grid's entry while they touch its squares, and grid readers hold it
//! shared, so nobody observes half of a per-email payment update.
//! Lock order is always grids before squares.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{
    AuditEntry, AuditPage, AuditQuery, Claim, ClaimFilter, ClaimGate, ClaimedSquare, Coordinate,
    Grid, GridDefaults, GridId, GridMutation, GridState, GridSummary, MutationOutcome,
    NewAuditEntry, Square, DEFAULT_GRID_ID,
};
use crate::error::{PoolError, Result};
use crate::persistence::PoolStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SquareKey {
    grid_id: GridId,
    coord: Coordinate,
}

impl SquareKey {
    fn new(grid_id: GridId, coord: Coordinate) -> Self {
        Self { grid_id, coord }
    }
}

pub struct MemoryStore {
    grids: DashMap<GridId, GridState>,
    squares: DashMap<SquareKey, Option<Claim>>,
    audit: RwLock<Vec<AuditEntry>>,
    next_grid_id: AtomicI64,
}

impl MemoryStore {
    /// Create a store seeded with the default grid
    pub fn new(defaults: &GridDefaults, now: DateTime<Utc>) -> Self {
        let store = Self {
            grids: DashMap::new(),
            squares: DashMap::new(),
            audit: RwLock::new(Vec::new()),
            next_grid_id: AtomicI64::new(DEFAULT_GRID_ID + 1),
        };
        let grid = Grid::new(
            DEFAULT_GRID_ID,
            Some(&defaults.default_grid_name),
            defaults,
            now,
        );
        store.insert_grid(GridState::new(grid));
        store
    }

    fn insert_grid(&self, state: GridState) {
        let id = state.grid.id;
        for coord in Coordinate::all() {
            self.squares.insert(SquareKey::new(id, coord), None);
        }
        self.grids.insert(id, state);
    }

    fn claims_in_grid(&self, grid_id: GridId) -> Vec<ClaimedSquare> {
        Coordinate::all()
            .filter_map(|coord| {
                let slot = self.squares.get(&SquareKey::new(grid_id, coord))?;
                slot.as_ref().map(|claim| ClaimedSquare {
                    grid_id,
                    coord,
                    claim: claim.clone(),
                })
            })
            .collect()
    }

    /// Runs `f` on every claim in the grid owned by `email`, holding the
    /// grid entry exclusively for the whole pass.
    fn update_owned<F>(&self, grid_id: GridId, email: &str, mut f: F) -> Result<u32>
    where
        F: FnMut(&mut Claim),
    {
        let _grid = self
            .grids
            .get_mut(&grid_id)
            .ok_or(PoolError::GridNotFound(grid_id))?;
        let mut owned = 0;
        for coord in Coordinate::all() {
            if let Some(mut slot) = self.squares.get_mut(&SquareKey::new(grid_id, coord)) {
                if let Some(claim) = slot.as_mut().filter(|c| c.owner.email == email) {
                    f(claim);
                    owned += 1;
                }
            }
        }
        Ok(owned)
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_grids(&self) -> Result<Vec<GridSummary>> {
        let mut out: Vec<GridSummary> = self
            .grids
            .iter()
            .map(|entry| {
                let id = *entry.key();
                let squares_sold = Coordinate::all()
                    .filter(|coord| {
                        self.squares
                            .get(&SquareKey::new(id, *coord))
                            .is_some_and(|slot| slot.is_some())
                    })
                    .count() as u32;
                GridSummary {
                    id,
                    name: entry.grid.name.clone(),
                    squares_sold,
                }
            })
            .collect();
        out.sort_by_key(|g| g.id);
        Ok(out)
    }

    async fn get_grid(&self, id: GridId) -> Result<GridState> {
        self.grids
            .get(&id)
            .map(|g| g.clone())
            .ok_or(PoolError::GridNotFound(id))
    }

    async fn create_grid(
        &self,
        name: Option<&str>,
        defaults: &GridDefaults,
        now: DateTime<Utc>,
    ) -> Result<GridState> {
        let id = self.next_grid_id.fetch_add(1, Ordering::SeqCst);
        let state = GridState::new(Grid::new(id, name, defaults, now));
        self.insert_grid(state.clone());
        info!("Created grid {} ({})", id, state.grid.name);
        Ok(state)
    }

    async fn delete_grid(&self, id: GridId) -> Result<()> {
        if self.grids.remove(&id).is_none() {
            return Err(PoolError::GridNotFound(id));
        }
        self.squares.retain(|key, _| key.grid_id != id);
        info!("Deleted grid {}", id);
        Ok(())
    }

    async fn mutate_grid(
        &self,
        id: GridId,
        mutation: &GridMutation,
    ) -> Result<(GridState, MutationOutcome)> {
        let mut entry = self
            .grids
            .get_mut(&id)
            .ok_or(PoolError::GridNotFound(id))?;
        let mut next = entry.clone();
        let outcome = mutation.apply(&mut next)?;
        if outcome.clears_squares {
            for coord in Coordinate::all() {
                if let Some(mut slot) = self.squares.get_mut(&SquareKey::new(id, coord)) {
                    *slot = None;
                }
            }
        }
        if outcome.changed {
            *entry = next;
        }
        Ok((entry.clone(), outcome))
    }

    async fn list_squares(&self, grid_id: GridId) -> Result<Vec<Square>> {
        let _grid = self
            .grids
            .get(&grid_id)
            .ok_or(PoolError::GridNotFound(grid_id))?;
        Ok(Coordinate::all()
            .map(|coord| Square {
                coord,
                claim: self
                    .squares
                    .get(&SquareKey::new(grid_id, coord))
                    .and_then(|slot| slot.clone()),
            })
            .collect())
    }

    async fn claim_square(
        &self,
        grid_id: GridId,
        coord: Coordinate,
        claim: &Claim,
        gate: ClaimGate,
    ) -> Result<()> {
        // Held shared so a concurrent lock either lands first or waits
        let grid = self
            .grids
            .get(&grid_id)
            .ok_or(PoolError::GridNotFound(grid_id))?;
        gate.check(&grid.grid)?;
        let mut slot = self
            .squares
            .get_mut(&SquareKey::new(grid_id, coord))
            .ok_or(PoolError::GridNotFound(grid_id))?;
        if slot.is_some() {
            return Err(PoolError::AlreadyClaimed);
        }
        *slot = Some(claim.clone());
        debug!("Grid {}: {} claimed by {}", grid_id, coord, claim.owner.email);
        Ok(())
    }

    async fn clear_square(&self, grid_id: GridId, coord: Coordinate) -> Result<Claim> {
        let mut slot = self
            .squares
            .get_mut(&SquareKey::new(grid_id, coord))
            .ok_or(PoolError::GridNotFound(grid_id))?;
        slot.take().ok_or(PoolError::NotClaimed)
    }

    async fn count_claims_by_email(&self, grid_id: GridId, email: &str) -> Result<u32> {
        Ok(Coordinate::all()
            .filter(|coord| {
                self.squares
                    .get(&SquareKey::new(grid_id, *coord))
                    .is_some_and(|slot| slot.as_ref().is_some_and(|c| c.owner.email == email))
            })
            .count() as u32)
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<ClaimedSquare>> {
        let mut grid_ids: Vec<GridId> = match filter.grid_id {
            Some(id) => vec![id],
            None => self.grids.iter().map(|g| *g.key()).collect(),
        };
        grid_ids.sort_unstable();

        let mut out = Vec::new();
        for grid_id in grid_ids {
            let Some(_grid) = self.grids.get(&grid_id) else {
                continue;
            };
            out.extend(
                self.claims_in_grid(grid_id)
                    .into_iter()
                    .filter(|c| filter.matches(c)),
            );
        }
        Ok(out)
    }

    async fn set_paid(&self, grid_id: GridId, email: &str, paid: bool) -> Result<u32> {
        self.update_owned(grid_id, email, |claim| claim.paid = paid)
    }

    async fn set_player_name(
        &self,
        grid_id: GridId,
        email: &str,
        player_name: Option<&str>,
    ) -> Result<u32> {
        let player_name = player_name.map(str::to_string);
        self.update_owned(grid_id, email, |claim| {
            claim.owner.player_name = player_name.clone()
        })
    }

    async fn append_audit(&self, entry: NewAuditEntry, at: DateTime<Utc>) -> Result<AuditEntry> {
        let mut log = self.audit.write().await;
        let entry = entry.into_entry(log.len() as i64 + 1, at);
        log.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<AuditPage> {
        let log = self.audit.read().await;
        let matching: Vec<&AuditEntry> = log.iter().rev().filter(|e| query.matches(e)).collect();
        Ok(AuditPage {
            total: matching.len(),
            entries: matching
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditAction, Owner};
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(&GridDefaults::default(), Utc::now())
    }

    fn claim(email: &str) -> Claim {
        Claim::new(Owner::new("Pat", email, None).unwrap(), Utc::now())
    }

    fn at(row: i64, col: i64) -> Coordinate {
        Coordinate::new(row, col).unwrap()
    }

    #[tokio::test]
    async fn test_default_grid_seeded() {
        let store = store();
        let grids = store.list_grids().await.unwrap();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].id, DEFAULT_GRID_ID);
        assert_eq!(grids[0].name, "Main Grid");
        assert_eq!(store.list_squares(1).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_second_claim_loses() {
        let store = store();
        store.claim_square(1, at(2, 3), &claim("a@x.com"), ClaimGate::Open).await.unwrap();
        let err = store
            .claim_square(1, at(2, 3), &claim("b@x.com"), ClaimGate::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::AlreadyClaimed));

        let squares = store.list_squares(1).await.unwrap();
        let owner = squares[at(2, 3).index()].claim.as_ref().unwrap();
        assert_eq!(owner.owner.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_square(1, at(5, 5), &claim(&format!("p{}@x.com", i)), ClaimGate::Open)
                    .await
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_public_gate_checked_against_current_grid() {
        let store = store();
        let public = ClaimGate::Public { now: Utc::now() };
        let numbers = crate::engine::numbers::draw().unwrap();
        store
            .mutate_grid(1, &GridMutation::AssignNumbers(numbers))
            .await
            .unwrap();
        store.claim_square(1, at(0, 0), &claim("a@x.com"), public).await.unwrap();
        store.mutate_grid(1, &GridMutation::LockNumbers).await.unwrap();

        assert!(matches!(
            store.claim_square(1, at(0, 1), &claim("a@x.com"), public).await,
            Err(PoolError::NumbersLocked)
        ));
        store.claim_square(1, at(0, 1), &claim("a@x.com"), ClaimGate::Open).await.unwrap();
        assert_eq!(store.count_claims_by_email(1, "a@x.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_unclaimed_square() {
        let store = store();
        assert!(matches!(
            store.clear_square(1, at(0, 0)).await,
            Err(PoolError::NotClaimed)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_squares() {
        let store = store();
        let grid = store
            .create_grid(None, &GridDefaults::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(grid.grid.name, "Grid 2");
        store.claim_square(2, at(1, 1), &claim("a@x.com"), ClaimGate::Open).await.unwrap();

        store.delete_grid(2).await.unwrap();
        assert!(store.get_grid(2).await.is_err());
        assert!(matches!(
            store.claim_square(2, at(1, 2), &claim("a@x.com"), ClaimGate::Open).await,
            Err(PoolError::GridNotFound(2))
        ));
        assert!(store
            .list_claims(&ClaimFilter::email("a@x.com"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_set_paid_covers_every_owned_square() {
        let store = store();
        for col in 0..3 {
            store.claim_square(1, at(0, col), &claim("a@x.com"), ClaimGate::Open).await.unwrap();
        }
        store.claim_square(1, at(1, 0), &claim("b@x.com"), ClaimGate::Open).await.unwrap();

        assert_eq!(store.set_paid(1, "a@x.com", true).await.unwrap(), 3);
        let claims = store.list_claims(&ClaimFilter::grid(1)).await.unwrap();
        for c in claims {
            assert_eq!(c.claim.paid, c.claim.owner.email == "a@x.com");
        }
    }

    #[tokio::test]
    async fn test_reset_clears_claims() {
        let store = store();
        store.claim_square(1, at(4, 4), &claim("a@x.com"), ClaimGate::Open).await.unwrap();
        let (_, outcome) = store.mutate_grid(1, &GridMutation::Reset).await.unwrap();
        assert!(outcome.clears_squares);
        assert!(store.list_claims(&ClaimFilter::grid(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_newest_first_with_paging() {
        let store = store();
        for i in 0..5 {
            store
                .append_audit(
                    NewAuditEntry::new(AuditAction::UpdateConfig, format!("change {}", i)).grid(1),
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        let page = store
            .list_audit(&AuditQuery {
                limit: 2,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].details, "change 3");
    }
}
