//! Pool service: the operations exposed to callers.
//!
//! Capability is decided once at the boundary. Public operations take a
//! [`Caller`]; administrative ones take an [`AdminGrant`]. Every admin
//! mutation is written to the audit log, rejected attempts included.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::domain::{
    ensure_deletable, normalize_email, AdminGrant, AuditAction, AuditPage, AuditQuery, Caller,
    Claim, ClaimFilter, ClaimGate, ConfigPatch, Coordinate, Grid, GridDefaults, GridId,
    GridMutation, GridSettings, GridState, GridSummary, MutationOutcome, NewAuditEntry,
    NumberAssignment, Owner, Quarter, QuarterScore, ScoresPatch, Square, MAX_SQUARES_LIMIT,
};
use crate::engine::{
    aggregate_participants, numbers, page_participants, player_totals, resolve, ClaimReport,
    ClaimWorkflow, ClaimantInput, ParticipantPage, ParticipantQuery, PlayerTotal, Selection,
    WinnerBoard,
};
use crate::error::{PoolError, Result};
use crate::persistence::PoolStore;

/// Broadcast to in-process collaborators (winner emails, payouts)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// Sent on every lock request, including re-locks
    QuarterLocked {
        grid_id: GridId,
        quarter: Quarter,
        score: QuarterScore,
    },
    QuarterUnlocked {
        grid_id: GridId,
        quarter: Quarter,
    },
    ScoresUpdated {
        grid_id: GridId,
        quarters: Vec<Quarter>,
    },
    GridReset {
        grid_id: GridId,
    },
}

/// One square as shown to a caller. Emails and payment flags are only
/// filled in for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareView {
    pub row: u8,
    pub col: u8,
    pub claimed: bool,
    pub owner_name: Option<String>,
    pub player_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl SquareView {
    fn new(square: &Square, is_admin: bool) -> Self {
        let claim = square.claim.as_ref();
        Self {
            row: square.coord.row(),
            col: square.coord.col(),
            claimed: claim.is_some(),
            owner_name: claim.map(|c| c.owner.name.clone()),
            player_name: claim.and_then(|c| c.owner.player_name.clone()),
            owner_email: claim
                .filter(|_| is_admin)
                .map(|c| c.owner.email.clone()),
            paid: claim.filter(|_| is_admin).map(|c| c.paid),
            claimed_at: claim.filter(|_| is_admin).map(|c| c.claimed_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridView {
    pub grid: Grid,
    pub settings: GridSettings,
    pub squares: Vec<SquareView>,
    pub squares_sold: u32,
    pub pot: Decimal,
    pub charity_percent: Decimal,
    pub charity_amount: Decimal,
    pub deadline_passed: bool,
    pub winners: WinnerBoard,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySquare {
    pub grid_id: GridId,
    pub row: u8,
    pub col: u8,
    pub name: String,
    pub player_name: Option<String>,
    pub paid: bool,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySquares {
    pub squares: Vec<MySquare>,
    pub count: usize,
    pub total_across_grids: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPaidReport {
    pub emails: usize,
    pub squares_updated: u32,
    /// Emails that own nothing in the grid
    pub unknown: Vec<String>,
}

fn square_count(squares: &[Square]) -> u32 {
    squares.iter().filter(|s| s.is_claimed()).count() as u32
}

fn pot(state: &GridState, sold: u32) -> Decimal {
    state.grid.price_per_square * Decimal::from(sold)
}

pub struct PoolService {
    store: Arc<dyn PoolStore>,
    clock: Arc<dyn Clock>,
    defaults: GridDefaults,
    events: broadcast::Sender<PoolEvent>,
}

impl PoolService {
    pub fn new(store: Arc<dyn PoolStore>, clock: Arc<dyn Clock>, defaults: GridDefaults) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            clock,
            defaults,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn emit(&self, event: PoolEvent) {
        debug!("Pool event: {:?}", event);
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // ==================== Audit ====================

    async fn record(&self, entry: NewAuditEntry) -> Result<()> {
        let action = entry.action;
        self.store
            .append_audit(entry, self.clock.now())
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("Failed to write audit entry for {}: {}", action, e);
                e
            })
    }

    /// Log the outcome of an admin action. A success that cannot be logged
    /// is reported as a failure; a rejection that cannot be logged is not.
    async fn audited<T>(&self, entry: NewAuditEntry, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                info!("Admin {}: {}", entry.action, entry.details);
                self.record(entry).await?;
                Ok(value)
            }
            Err(e) => {
                warn!("Admin {} rejected: {}", entry.action, e);
                let _ = self.record(entry.rejected(&e)).await;
                Err(e)
            }
        }
    }

    // ==================== Reads ====================

    pub async fn list_grids(&self) -> Result<Vec<GridSummary>> {
        self.store.list_grids().await
    }

    pub async fn grid_state(&self, grid_id: GridId) -> Result<GridState> {
        self.store.get_grid(grid_id).await
    }

    pub async fn grid_view(&self, caller: &Caller, grid_id: GridId) -> Result<GridView> {
        let state = self.store.get_grid(grid_id).await?;
        let squares = self.store.list_squares(grid_id).await?;
        let is_admin = caller.is_admin();
        let sold = square_count(&squares);
        let pot = pot(&state, sold);
        let winners = self.board(caller, &state, &squares, pot);

        Ok(GridView {
            deadline_passed: state.grid.deadline_passed(self.clock.now()),
            squares: squares.iter().map(|s| SquareView::new(s, is_admin)).collect(),
            squares_sold: sold,
            pot,
            charity_percent: state.settings.prizes.charity_percent(),
            charity_amount: state.settings.prizes.charity_amount(pot),
            winners,
            is_admin,
            grid: state.grid,
            settings: state.settings,
        })
    }

    fn board(
        &self,
        caller: &Caller,
        state: &GridState,
        squares: &[Square],
        pot: Decimal,
    ) -> WinnerBoard {
        if !state.settings.show_winners && !caller.is_admin() {
            return WinnerBoard::default();
        }
        resolve(state.grid.numbers.as_ref(), &state.settings.scores, squares)
            .priced(&state.settings.prizes, pot)
    }

    pub async fn winners(&self, caller: &Caller, grid_id: GridId) -> Result<WinnerBoard> {
        let state = self.store.get_grid(grid_id).await?;
        let squares = self.store.list_squares(grid_id).await?;
        let pot = pot(&state, square_count(&squares));
        Ok(self.board(caller, &state, &squares, pot))
    }

    pub async fn my_squares(&self, email: &str, grid_id: Option<GridId>) -> Result<MySquares> {
        let email = normalize_email(email)?;
        let all = self.store.list_claims(&ClaimFilter::email(email)).await?;
        let total_across_grids = all.len();
        let squares: Vec<MySquare> = all
            .into_iter()
            .filter(|c| grid_id.map_or(true, |id| id == c.grid_id))
            .map(|c| MySquare {
                grid_id: c.grid_id,
                row: c.coord.row(),
                col: c.coord.col(),
                name: c.claim.owner.name,
                player_name: c.claim.owner.player_name,
                paid: c.claim.paid,
                claimed_at: c.claim.claimed_at,
            })
            .collect();
        Ok(MySquares {
            count: squares.len(),
            squares,
            total_across_grids,
        })
    }

    // ==================== Claims ====================

    /// Checks that apply to non-admin claims before any square is touched
    fn ensure_claims_open(&self, caller: &Caller, state: &GridState) -> Result<()> {
        if caller.is_admin() {
            return Ok(());
        }
        if state.grid.deadline_passed(self.clock.now()) {
            return Err(PoolError::DeadlinePassed);
        }
        if state.grid.numbers_locked {
            return Err(PoolError::NumbersLocked);
        }
        Ok(())
    }

    async fn claim_one(
        &self,
        caller: &Caller,
        state: &GridState,
        coord: Coordinate,
        owner: Owner,
    ) -> Result<()> {
        let grid_id = state.grid.id;
        self.ensure_claims_open(caller, state)?;
        if !caller.is_admin() {
            let limit = state.grid.squares_limit;
            let owned = self.store.count_claims_by_email(grid_id, &owner.email).await?;
            if owned >= limit {
                return Err(PoolError::LimitExceeded { limit });
            }
        }

        let now = self.clock.now();
        let gate = if caller.is_admin() {
            ClaimGate::Open
        } else {
            ClaimGate::Public { now }
        };
        let email = owner.email.clone();
        let result = self
            .store
            .claim_square(grid_id, coord, &Claim::new(owner, now), gate)
            .await;

        if caller.is_admin() {
            let entry = NewAuditEntry::new(AuditAction::ClaimSquare, format!("Claimed {}", coord))
                .grid(grid_id)
                .square(coord)
                .email(email);
            return self.audited(entry, result).await;
        }
        result
    }

    pub async fn claim_square(
        &self,
        caller: &Caller,
        grid_id: GridId,
        coord: Coordinate,
        claimant: &ClaimantInput,
    ) -> Result<()> {
        let owner = claimant.owner()?;
        let state = self.store.get_grid(grid_id).await?;
        self.claim_one(caller, &state, coord, owner).await
    }

    /// Claim a batch. Squares are claimed independently; the report says
    /// which ones made it.
    pub async fn claim_squares(
        &self,
        caller: &Caller,
        grid_id: GridId,
        squares: Vec<Coordinate>,
        claimant: &ClaimantInput,
    ) -> Result<ClaimReport> {
        let state = self.store.get_grid(grid_id).await?;
        let limit = if caller.is_admin() {
            MAX_SQUARES_LIMIT
        } else {
            state.grid.squares_limit
        };
        let selection = Selection::from_squares(grid_id, limit, squares)?;

        if !caller.is_admin() {
            self.ensure_claims_open(caller, &state)?;
            let owner = claimant.owner()?;
            let owned = self.store.count_claims_by_email(grid_id, &owner.email).await?;
            if owned as usize + selection.len() > limit as usize {
                return Err(PoolError::LimitExceeded { limit });
            }
        }

        let mut workflow = ClaimWorkflow::new(selection);
        let state = &state;
        workflow
            .submit(claimant, move |coord, owner| async move {
                self.claim_one(caller, state, coord, owner).await
            })
            .await
    }

    // ==================== Grids (admin) ====================

    pub async fn create_grid(&self, _admin: &AdminGrant, name: Option<&str>) -> Result<GridState> {
        let result = self
            .store
            .create_grid(name, &self.defaults, self.clock.now())
            .await;
        let entry = match &result {
            Ok(state) => NewAuditEntry::new(
                AuditAction::CreateGrid,
                format!("Created grid \"{}\"", state.grid.name),
            )
            .grid(state.grid.id),
            Err(_) => NewAuditEntry::new(AuditAction::CreateGrid, "Create grid"),
        };
        self.audited(entry, result).await
    }

    pub async fn delete_grid(&self, _admin: &AdminGrant, grid_id: GridId) -> Result<()> {
        let result = match ensure_deletable(grid_id) {
            Ok(()) => self.store.delete_grid(grid_id).await,
            Err(e) => Err(e),
        };
        let entry = NewAuditEntry::new(AuditAction::DeleteGrid, format!("Deleted grid {}", grid_id))
            .grid(grid_id);
        self.audited(entry, result).await
    }

    async fn mutate(
        &self,
        grid_id: GridId,
        mutation: GridMutation,
        entry: NewAuditEntry,
    ) -> Result<(GridState, MutationOutcome)> {
        let result = self.store.mutate_grid(grid_id, &mutation).await;
        self.audited(entry.grid(grid_id), result).await
    }

    /// Full wipe: claims, numbers, number lock, scores and quarter locks
    pub async fn reset_grid(&self, _admin: &AdminGrant, grid_id: GridId) -> Result<GridState> {
        let (state, _) = self
            .mutate(
                grid_id,
                GridMutation::Reset,
                NewAuditEntry::new(AuditAction::ResetGrid, "Reset grid"),
            )
            .await?;
        self.emit(PoolEvent::GridReset { grid_id });
        Ok(state)
    }

    pub async fn clear_square(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        coord: Coordinate,
    ) -> Result<Claim> {
        let result = self.store.clear_square(grid_id, coord).await;
        let mut entry = NewAuditEntry::new(AuditAction::ClearSquare, format!("Cleared {}", coord))
            .grid(grid_id)
            .square(coord);
        if let Ok(claim) = &result {
            entry = entry.email(claim.owner.email.clone());
        }
        self.audited(entry, result).await
    }

    // ==================== Numbers (admin) ====================

    pub async fn randomize_numbers(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
    ) -> Result<NumberAssignment> {
        let drawn = numbers::draw()?;
        let details = format!(
            "Rows {:?}, cols {:?}",
            drawn.row_numbers.as_slice(),
            drawn.col_numbers.as_slice()
        );
        self.mutate(
            grid_id,
            GridMutation::AssignNumbers(drawn),
            NewAuditEntry::new(AuditAction::RandomizeNumbers, details),
        )
        .await?;
        Ok(drawn)
    }

    pub async fn clear_numbers(&self, _admin: &AdminGrant, grid_id: GridId) -> Result<()> {
        self.mutate(
            grid_id,
            GridMutation::ClearNumbers,
            NewAuditEntry::new(AuditAction::ClearNumbers, "Cleared row/column numbers"),
        )
        .await
        .map(|_| ())
    }

    pub async fn lock_numbers(&self, _admin: &AdminGrant, grid_id: GridId) -> Result<()> {
        self.mutate(
            grid_id,
            GridMutation::LockNumbers,
            NewAuditEntry::new(AuditAction::LockNumbers, "Locked numbers"),
        )
        .await
        .map(|_| ())
    }

    // ==================== Config & scores (admin) ====================

    pub async fn save_config(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        patch: ConfigPatch,
    ) -> Result<GridState> {
        let details = format!("Updated {}", patch.field_names().join(", "));
        let result = if patch.is_empty() {
            Err(PoolError::validation("No configuration fields provided"))
        } else {
            self.store
                .mutate_grid(grid_id, &GridMutation::Configure(patch))
                .await
        };
        let entry = NewAuditEntry::new(AuditAction::UpdateConfig, details).grid(grid_id);
        self.audited(entry, result).await.map(|(state, _)| state)
    }

    /// Manual score entry. Touching a locked quarter rejects the whole save.
    pub async fn save_scores(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        patch: ScoresPatch,
    ) -> Result<Vec<Quarter>> {
        let details = format!("Scores for {}", describe_quarters(&patch.touched()));
        let (_, outcome) = self
            .mutate(
                grid_id,
                GridMutation::SaveScores(patch),
                NewAuditEntry::new(AuditAction::UpdateScores, details),
            )
            .await?;
        if !outcome.quarters.is_empty() {
            self.emit(PoolEvent::ScoresUpdated {
                grid_id,
                quarters: outcome.quarters.clone(),
            });
        }
        Ok(outcome.quarters)
    }

    /// Commit scores fetched from the live feed. Locked quarters are left
    /// alone; an unchanged batch is a no-op and is not logged.
    pub async fn commit_synced_scores(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        patch: ScoresPatch,
    ) -> Result<Vec<Quarter>> {
        let (_, outcome) = match self
            .store
            .mutate_grid(grid_id, &GridMutation::SyncScores(patch.clone()))
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                let details = format!("Live sync for {}", describe_quarters(&patch.touched()));
                let entry = NewAuditEntry::new(AuditAction::LiveSync, details).grid(grid_id);
                return self.audited(entry, Err(e)).await;
            }
        };
        if outcome.quarters.is_empty() {
            debug!("Grid {}: live scores unchanged", grid_id);
            return Ok(outcome.quarters);
        }

        let entry = NewAuditEntry::new(
            AuditAction::LiveSync,
            format!("Live sync updated {}", describe_quarters(&outcome.quarters)),
        )
        .grid(grid_id);
        self.audited(entry, Ok(())).await?;
        self.emit(PoolEvent::ScoresUpdated {
            grid_id,
            quarters: outcome.quarters.clone(),
        });
        Ok(outcome.quarters)
    }

    pub async fn set_quarter_lock(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        quarter: Quarter,
        locked: bool,
    ) -> Result<GridState> {
        let (action, verb) = if locked {
            (AuditAction::LockQuarter, "Locked")
        } else {
            (AuditAction::UnlockQuarter, "Unlocked")
        };
        let (state, outcome) = self
            .mutate(
                grid_id,
                GridMutation::SetQuarterLock { quarter, locked },
                NewAuditEntry::new(action, format!("{} {}", verb, quarter)),
            )
            .await?;

        if locked {
            if !outcome.changed {
                info!("Grid {}: {} re-locked", grid_id, quarter);
            }
            self.emit(PoolEvent::QuarterLocked {
                grid_id,
                quarter,
                score: state.settings.scores.get(quarter),
            });
        } else {
            self.emit(PoolEvent::QuarterUnlocked { grid_id, quarter });
        }
        Ok(state)
    }

    pub async fn set_live_sync(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        enabled: bool,
    ) -> Result<GridState> {
        let action = if enabled {
            AuditAction::EnableLiveSync
        } else {
            AuditAction::DisableLiveSync
        };
        let details = if enabled {
            "Live sync enabled"
        } else {
            "Live sync disabled"
        };
        self.mutate(
            grid_id,
            GridMutation::SetLiveSync(enabled),
            NewAuditEntry::new(action, details),
        )
        .await
        .map(|(state, _)| state)
    }

    // ==================== Ledger (admin) ====================

    pub async fn participants(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        query: &ParticipantQuery,
    ) -> Result<ParticipantPage> {
        let state = self.store.get_grid(grid_id).await?;
        let claims = self.store.list_claims(&ClaimFilter::grid(grid_id)).await?;
        let price = state.grid.price_per_square;
        Ok(page_participants(
            aggregate_participants(&claims, price),
            query,
            price,
        ))
    }

    pub async fn toggle_paid(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        email: &str,
        paid: bool,
    ) -> Result<u32> {
        let action = if paid {
            AuditAction::MarkPaid
        } else {
            AuditAction::MarkUnpaid
        };
        let result = match normalize_email(email) {
            Ok(email) => self.set_paid_owned(grid_id, &email, paid).await,
            Err(e) => Err(e),
        };
        let details = match &result {
            Ok(n) => format!("{} square(s) marked {}", n, paid_word(paid)),
            Err(_) => format!("Mark {}", paid_word(paid)),
        };
        let entry = NewAuditEntry::new(action, details)
            .grid(grid_id)
            .email(email.trim().to_lowercase());
        self.audited(entry, result).await
    }

    async fn set_paid_owned(&self, grid_id: GridId, email: &str, paid: bool) -> Result<u32> {
        match self.store.set_paid(grid_id, email, paid).await? {
            0 => Err(PoolError::NotFound(format!("No squares claimed by {}", email))),
            n => Ok(n),
        }
    }

    /// Applies to each email on its own; re-applying is a no-op
    pub async fn bulk_mark_paid(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        emails: &[String],
        paid: bool,
    ) -> Result<BulkPaidReport> {
        let result = self.bulk_set_paid(grid_id, emails, paid).await;
        let details = match &result {
            Ok(r) => format!(
                "{} email(s), {} square(s) marked {}",
                r.emails,
                r.squares_updated,
                paid_word(paid)
            ),
            Err(_) => format!("Bulk mark {}", paid_word(paid)),
        };
        let entry = NewAuditEntry::new(AuditAction::BulkMarkPaid, details).grid(grid_id);
        self.audited(entry, result).await
    }

    async fn bulk_set_paid(
        &self,
        grid_id: GridId,
        emails: &[String],
        paid: bool,
    ) -> Result<BulkPaidReport> {
        let mut normalized: Vec<String> = emails
            .iter()
            .map(|e| normalize_email(e))
            .collect::<Result<_>>()?;
        normalized.sort();
        normalized.dedup();

        self.store.get_grid(grid_id).await?;
        let mut report = BulkPaidReport {
            emails: normalized.len(),
            squares_updated: 0,
            unknown: Vec::new(),
        };
        for email in normalized {
            match self.store.set_paid(grid_id, &email, paid).await? {
                0 => report.unknown.push(email),
                n => report.squares_updated += n,
            }
        }
        Ok(report)
    }

    pub async fn update_player_name(
        &self,
        _admin: &AdminGrant,
        grid_id: GridId,
        email: &str,
        player_name: Option<&str>,
    ) -> Result<u32> {
        let player_name = player_name.map(str::trim).filter(|p| !p.is_empty());
        let result = match normalize_email(email) {
            Ok(email) => match self.store.set_player_name(grid_id, &email, player_name).await {
                Ok(0) => Err(PoolError::NotFound(format!("No squares claimed by {}", email))),
                other => other,
            },
            Err(e) => Err(e),
        };
        let entry = NewAuditEntry::new(
            AuditAction::UpdatePlayerName,
            format!("Player name set to {:?}", player_name.unwrap_or("")),
        )
        .grid(grid_id)
        .email(email.trim().to_lowercase());
        self.audited(entry, result).await
    }

    pub async fn player_totals(&self, _admin: &AdminGrant) -> Result<Vec<PlayerTotal>> {
        let claims = self.store.list_claims(&ClaimFilter::default()).await?;
        Ok(player_totals(&claims))
    }

    pub async fn audit_log(&self, _admin: &AdminGrant, query: &AuditQuery) -> Result<AuditPage> {
        self.store.list_audit(query).await
    }
}

fn paid_word(paid: bool) -> &'static str {
    if paid {
        "paid"
    } else {
        "unpaid"
    }
}

struct QuarterList<'a>(&'a [Quarter]);

impl fmt::Display for QuarterList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no quarters");
        }
        for (i, q) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", q)?;
        }
        Ok(())
    }
}

fn describe_quarters(quarters: &[Quarter]) -> String {
    QuarterList(quarters).to_string()
}
