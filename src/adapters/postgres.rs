use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use crate::domain::{
    AuditAction, AuditEntry, AuditPage, AuditQuery, Claim, ClaimFilter, ClaimGate, ClaimedSquare,
    Coordinate, Digits, Grid, GridDefaults, GridId, GridMutation, GridSettings, GridState,
    GridSummary, MutationOutcome, NewAuditEntry, NumberAssignment, Owner, Square,
};
use crate::error::{PoolError, Result};
use crate::persistence::PoolStore;

const GRID_COLUMNS: &str = "id, name, squares_limit, price_per_square, numbers_locked, \
     claim_deadline, row_numbers, col_numbers, settings, created_at";

const SQUARE_COLUMNS: &str =
    "grid_id, row_idx, col_idx, owner_name, owner_email, player_name, paid, claimed_at";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn grid_exists(&self, id: GridId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM grids WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("found"))
    }

    async fn ensure_grid(&self, id: GridId) -> Result<()> {
        if self.grid_exists(id).await? {
            Ok(())
        } else {
            Err(PoolError::GridNotFound(id))
        }
    }

    async fn write_grid(tx: &mut Transaction<'_, Postgres>, state: &GridState) -> Result<()> {
        let grid = &state.grid;
        let (row_numbers, col_numbers) = match &grid.numbers {
            Some(n) => (Some(digits_to_db(&n.row_numbers)), Some(digits_to_db(&n.col_numbers))),
            None => (None, None),
        };
        sqlx::query(
            r#"
            UPDATE grids SET
                name = $2,
                squares_limit = $3,
                price_per_square = $4,
                numbers_locked = $5,
                claim_deadline = $6,
                row_numbers = $7,
                col_numbers = $8,
                settings = $9
            WHERE id = $1
            "#,
        )
        .bind(grid.id)
        .bind(&grid.name)
        .bind(grid.squares_limit as i32)
        .bind(grid.price_per_square)
        .bind(grid.numbers_locked)
        .bind(grid.claim_deadline)
        .bind(row_numbers)
        .bind(col_numbers)
        .bind(serde_json::to_value(&state.settings)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn digits_to_db(digits: &Digits) -> Vec<i32> {
    digits.as_slice().iter().map(|d| *d as i32).collect()
}

fn digits_from_db(values: Vec<i32>) -> Result<Digits> {
    Digits::try_from(values.into_iter().map(i64::from).collect::<Vec<_>>())
}

fn grid_state_from_row(row: &PgRow) -> Result<GridState> {
    let numbers = match (
        row.try_get::<Option<Vec<i32>>, _>("row_numbers")?,
        row.try_get::<Option<Vec<i32>>, _>("col_numbers")?,
    ) {
        (Some(rows), Some(cols)) => Some(NumberAssignment {
            row_numbers: digits_from_db(rows)?,
            col_numbers: digits_from_db(cols)?,
        }),
        _ => None,
    };
    let settings: GridSettings = serde_json::from_value(row.try_get("settings")?)?;
    let squares_limit: i32 = row.try_get("squares_limit")?;
    let price_per_square: Decimal = row.try_get("price_per_square")?;

    Ok(GridState {
        grid: Grid {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            squares_limit: squares_limit.max(0) as u32,
            price_per_square,
            numbers_locked: row.try_get("numbers_locked")?,
            claim_deadline: row.try_get("claim_deadline")?,
            numbers,
            created_at: row.try_get("created_at")?,
        },
        settings,
    })
}

fn coord_from_row(row: &PgRow) -> Result<Coordinate> {
    let r: i16 = row.try_get("row_idx")?;
    let c: i16 = row.try_get("col_idx")?;
    Coordinate::new(r.into(), c.into())
}

fn claim_from_row(row: &PgRow) -> Result<Option<Claim>> {
    let email: Option<String> = row.try_get("owner_email")?;
    let Some(email) = email else {
        return Ok(None);
    };
    let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at")?;
    Ok(Some(Claim {
        owner: Owner {
            name: row.try_get::<Option<String>, _>("owner_name")?.unwrap_or_default(),
            email,
            player_name: row.try_get("player_name")?,
        },
        paid: row.try_get("paid")?,
        claimed_at: claimed_at.unwrap_or_else(Utc::now),
    }))
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
    let action: String = row.try_get("action")?;
    let row_idx: Option<i16> = row.try_get("row_idx")?;
    let col_idx: Option<i16> = row.try_get("col_idx")?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        action: AuditAction::try_from(action.as_str()).map_err(PoolError::Internal)?,
        actor: row.try_get("actor")?,
        target_email: row.try_get("target_email")?,
        grid_id: row.try_get("grid_id")?,
        row: row_idx.map(|r| r as u8),
        col: col_idx.map(|c| c as u8),
        details: row.try_get("details")?,
        succeeded: row.try_get("succeeded")?,
    })
}

#[async_trait]
impl PoolStore for PostgresStore {
    async fn list_grids(&self) -> Result<Vec<GridSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.name, COUNT(s.owner_email) AS squares_sold
            FROM grids g
            LEFT JOIN squares s ON s.grid_id = g.id
            GROUP BY g.id, g.name
            ORDER BY g.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let sold: i64 = r.try_get("squares_sold")?;
                Ok(GridSummary {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    squares_sold: sold as u32,
                })
            })
            .collect()
    }

    async fn get_grid(&self, id: GridId) -> Result<GridState> {
        let row = sqlx::query(&format!("SELECT {} FROM grids WHERE id = $1", GRID_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PoolError::GridNotFound(id))?;
        grid_state_from_row(&row)
    }

    #[instrument(skip(self, defaults))]
    async fn create_grid(
        &self,
        name: Option<&str>,
        defaults: &GridDefaults,
        now: DateTime<Utc>,
    ) -> Result<GridState> {
        let mut tx = self.pool.begin().await?;

        let id: GridId = sqlx::query("SELECT nextval(pg_get_serial_sequence('grids', 'id')) AS id")
            .fetch_one(&mut *tx)
            .await?
            .get("id");
        let state = GridState::new(Grid::new(id, name, defaults, now));

        sqlx::query(
            r#"
            INSERT INTO grids (id, name, squares_limit, price_per_square, settings, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&state.grid.name)
        .bind(state.grid.squares_limit as i32)
        .bind(state.grid.price_per_square)
        .bind(serde_json::to_value(&state.settings)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO squares (grid_id, row_idx, col_idx)
            SELECT $1, r, c FROM generate_series(0, 9) AS r, generate_series(0, 9) AS c
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Created grid {} ({})", id, state.grid.name);
        Ok(state)
    }

    #[instrument(skip(self))]
    async fn delete_grid(&self, id: GridId) -> Result<()> {
        let result = sqlx::query("DELETE FROM grids WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PoolError::GridNotFound(id));
        }
        info!("Deleted grid {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mutate_grid(
        &self,
        id: GridId,
        mutation: &GridMutation,
    ) -> Result<(GridState, MutationOutcome)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM grids WHERE id = $1 FOR UPDATE",
            GRID_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PoolError::GridNotFound(id))?;
        let mut state = grid_state_from_row(&row)?;

        // Dropping the transaction on error rolls it back
        let outcome = mutation.apply(&mut state)?;

        if outcome.changed {
            Self::write_grid(&mut tx, &state).await?;
        }
        if outcome.clears_squares {
            sqlx::query(
                r#"
                UPDATE squares SET
                    owner_name = NULL, owner_email = NULL, player_name = NULL,
                    paid = FALSE, claimed_at = NULL
                WHERE grid_id = $1
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((state, outcome))
    }

    async fn list_squares(&self, grid_id: GridId) -> Result<Vec<Square>> {
        self.ensure_grid(grid_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM squares WHERE grid_id = $1 ORDER BY row_idx, col_idx",
            SQUARE_COLUMNS
        ))
        .bind(grid_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(Square {
                    coord: coord_from_row(r)?,
                    claim: claim_from_row(r)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, claim), fields(email = %claim.owner.email))]
    async fn claim_square(
        &self,
        grid_id: GridId,
        coord: Coordinate,
        claim: &Claim,
        gate: ClaimGate,
    ) -> Result<()> {
        let (open, now) = match gate {
            ClaimGate::Open => (true, claim.claimed_at),
            ClaimGate::Public { now } => (false, now),
        };
        // FOR SHARE waits out a concurrent lock and re-reads the grid row
        let result = sqlx::query(
            r#"
            WITH gate AS (
                SELECT id FROM grids
                WHERE id = $1
                  AND ($9 OR (NOT numbers_locked
                              AND (claim_deadline IS NULL OR claim_deadline > $10)))
                FOR SHARE
            )
            UPDATE squares s SET
                owner_name = $4, owner_email = $5, player_name = $6,
                paid = $7, claimed_at = $8
            FROM gate
            WHERE s.grid_id = gate.id AND s.row_idx = $2 AND s.col_idx = $3
              AND s.owner_email IS NULL
            "#,
        )
        .bind(grid_id)
        .bind(coord.row() as i16)
        .bind(coord.col() as i16)
        .bind(&claim.owner.name)
        .bind(&claim.owner.email)
        .bind(&claim.owner.player_name)
        .bind(claim.paid)
        .bind(claim.claimed_at)
        .bind(open)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let state = self.get_grid(grid_id).await?;
            gate.check(&state.grid)?;
            return Err(PoolError::AlreadyClaimed);
        }
        debug!("Grid {}: {} claimed", grid_id, coord);
        Ok(())
    }

    async fn clear_square(&self, grid_id: GridId, coord: Coordinate) -> Result<Claim> {
        let row = sqlx::query(
            r#"
            WITH old AS (
                SELECT grid_id, row_idx, col_idx, owner_name, owner_email, player_name, paid, claimed_at
                FROM squares
                WHERE grid_id = $1 AND row_idx = $2 AND col_idx = $3 AND owner_email IS NOT NULL
                FOR UPDATE
            )
            UPDATE squares s SET
                owner_name = NULL, owner_email = NULL, player_name = NULL,
                paid = FALSE, claimed_at = NULL
            FROM old
            WHERE s.grid_id = old.grid_id AND s.row_idx = old.row_idx AND s.col_idx = old.col_idx
            RETURNING old.owner_name, old.owner_email, old.player_name, old.paid, old.claimed_at
            "#,
        )
        .bind(grid_id)
        .bind(coord.row() as i16)
        .bind(coord.col() as i16)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => claim_from_row(&row)?.ok_or(PoolError::NotClaimed),
            None => {
                self.ensure_grid(grid_id).await?;
                Err(PoolError::NotClaimed)
            }
        }
    }

    async fn count_claims_by_email(&self, grid_id: GridId, email: &str) -> Result<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS owned FROM squares WHERE grid_id = $1 AND owner_email = $2",
        )
        .bind(grid_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        let owned: i64 = row.get("owned");
        Ok(owned as u32)
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<ClaimedSquare>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM squares
            WHERE owner_email IS NOT NULL
              AND ($1::BIGINT IS NULL OR grid_id = $1)
              AND ($2::TEXT IS NULL OR owner_email = $2)
            ORDER BY grid_id, row_idx, col_idx
            "#,
            SQUARE_COLUMNS
        ))
        .bind(filter.grid_id)
        .bind(filter.email.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            if let Some(claim) = claim_from_row(r)? {
                out.push(ClaimedSquare {
                    grid_id: r.try_get("grid_id")?,
                    coord: coord_from_row(r)?,
                    claim,
                });
            }
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn set_paid(&self, grid_id: GridId, email: &str, paid: bool) -> Result<u32> {
        // One statement, so every owned square flips together
        let result =
            sqlx::query("UPDATE squares SET paid = $3 WHERE grid_id = $1 AND owner_email = $2")
                .bind(grid_id)
                .bind(email)
                .bind(paid)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            self.ensure_grid(grid_id).await?;
        }
        Ok(result.rows_affected() as u32)
    }

    async fn set_player_name(
        &self,
        grid_id: GridId,
        email: &str,
        player_name: Option<&str>,
    ) -> Result<u32> {
        let result = sqlx::query(
            "UPDATE squares SET player_name = $3 WHERE grid_id = $1 AND owner_email = $2",
        )
        .bind(grid_id)
        .bind(email)
        .bind(player_name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            self.ensure_grid(grid_id).await?;
        }
        Ok(result.rows_affected() as u32)
    }

    async fn append_audit(&self, entry: NewAuditEntry, at: DateTime<Utc>) -> Result<AuditEntry> {
        let draft = entry.into_entry(0, at);
        let row = sqlx::query(
            r#"
            INSERT INTO audit_log
                (timestamp, action, actor, target_email, grid_id, row_idx, col_idx, details, succeeded)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(draft.timestamp)
        .bind(draft.action.as_str())
        .bind(&draft.actor)
        .bind(&draft.target_email)
        .bind(draft.grid_id)
        .bind(draft.row.map(i16::from))
        .bind(draft.col.map(i16::from))
        .bind(&draft.details)
        .bind(draft.succeeded)
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditEntry {
            id: row.get("id"),
            ..draft
        })
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<AuditPage> {
        const FILTER: &str = r#"
            WHERE ($1::TEXT IS NULL OR action = $1)
              AND ($2::TEXT IS NULL OR LOWER(target_email) = LOWER($2))
              AND ($3::BIGINT IS NULL OR grid_id = $3)
        "#;
        let action = query.action.map(|a| a.as_str());

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM audit_log {}", FILTER))
            .bind(action)
            .bind(query.email.as_deref())
            .bind(query.grid_id)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, timestamp, action, actor, target_email, grid_id, row_idx, col_idx, details, succeeded
            FROM audit_log {}
            ORDER BY id DESC
            LIMIT $4 OFFSET $5
            "#,
            FILTER
        ))
        .bind(action)
        .bind(query.email.as_deref())
        .bind(query.grid_id)
        .bind(query.limit as i64)
        .bind(query.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(AuditPage {
            entries: rows.iter().map(audit_from_row).collect::<Result<_>>()?,
            total: total as usize,
        })
    }
}
