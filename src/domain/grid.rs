use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::GridSettings;
use crate::error::{PoolError, Result};

pub type GridId = i64;

/// The grid every installation starts with; it can never be deleted
pub const DEFAULT_GRID_ID: GridId = 1;

/// Rows and columns per grid
pub const GRID_SIZE: usize = 10;

/// Upper bound for `squares_limit`
pub const MAX_SQUARES_LIMIT: u32 = (GRID_SIZE * GRID_SIZE) as u32;

/// A validated cell position, both axes in `0..10`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    row: u8,
    col: u8,
}

#[derive(Deserialize)]
struct RawCoordinate {
    row: i64,
    col: i64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = PoolError;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Coordinate::new(raw.row, raw.col)
    }
}

impl Coordinate {
    pub fn new(row: i64, col: i64) -> Result<Self> {
        let range = 0..GRID_SIZE as i64;
        if !range.contains(&row) || !range.contains(&col) {
            return Err(PoolError::InvalidCoordinate { row, col });
        }
        Ok(Self {
            row: row as u8,
            col: col as u8,
        })
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn col(&self) -> u8 {
        self.col
    }

    /// Row-major position inside a 100-cell grid
    pub fn index(&self) -> usize {
        self.row as usize * GRID_SIZE + self.col as usize
    }

    /// Every cell in row-major order
    pub fn all() -> impl Iterator<Item = Coordinate> {
        (0..GRID_SIZE as u8)
            .flat_map(|row| (0..GRID_SIZE as u8).map(move |col| Coordinate { row, col }))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}, Col {}", self.row, self.col)
    }
}

/// One axis of digits: a permutation of `0..=9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<u8>")]
pub struct Digits([u8; GRID_SIZE]);

impl Digits {
    pub fn new(values: [u8; GRID_SIZE]) -> Result<Self> {
        let mut seen = [false; GRID_SIZE];
        for &d in &values {
            let slot = seen
                .get_mut(d as usize)
                .ok_or_else(|| PoolError::validation(format!("digit {} out of range", d)))?;
            if *slot {
                return Err(PoolError::validation(format!("digit {} repeated", d)));
            }
            *slot = true;
        }
        Ok(Self(values))
    }

    /// Position of `digit` along this axis
    pub fn position_of(&self, digit: u8) -> Option<usize> {
        self.0.iter().position(|&d| d == digit)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<i64>> for Digits {
    type Error = PoolError;

    fn try_from(values: Vec<i64>) -> Result<Self> {
        if values.len() != GRID_SIZE {
            return Err(PoolError::validation(format!(
                "expected {} digits, got {}",
                GRID_SIZE,
                values.len()
            )));
        }
        let mut out = [0u8; GRID_SIZE];
        for (slot, v) in out.iter_mut().zip(values) {
            *slot = u8::try_from(v)
                .map_err(|_| PoolError::validation(format!("digit {} out of range", v)))?;
        }
        Digits::new(out)
    }
}

impl From<Digits> for Vec<u8> {
    fn from(d: Digits) -> Self {
        d.0.to_vec()
    }
}

/// Row and column digits, always assigned together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberAssignment {
    pub row_numbers: Digits,
    pub col_numbers: Digits,
}

/// Grid header: identity, pricing and the number draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub id: GridId,
    pub name: String,
    pub squares_limit: u32,
    pub price_per_square: Decimal,
    pub numbers_locked: bool,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub numbers: Option<NumberAssignment>,
    pub created_at: DateTime<Utc>,
}

impl Grid {
    pub fn new(
        id: GridId,
        name: Option<&str>,
        defaults: &GridDefaults,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Self::default_name(id));
        Self {
            id,
            name,
            squares_limit: defaults.squares_limit,
            price_per_square: defaults.price_per_square,
            numbers_locked: false,
            claim_deadline: None,
            numbers: None,
            created_at: now,
        }
    }

    /// Name given to grids created without one
    pub fn default_name(id: GridId) -> String {
        format!("Grid {}", id)
    }

    pub fn is_protected(&self) -> bool {
        self.id == DEFAULT_GRID_ID
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.claim_deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Grid-level conditions checked by the store in the same step as the
/// square's compare-and-set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimGate {
    /// Admin claims ignore the numbers lock and the deadline
    Open,
    /// Refused once numbers are locked or the deadline is reached at `now`
    Public { now: DateTime<Utc> },
}

impl ClaimGate {
    pub fn check(&self, grid: &Grid) -> Result<()> {
        let ClaimGate::Public { now } = self else {
            return Ok(());
        };
        if grid.deadline_passed(*now) {
            return Err(PoolError::DeadlinePassed);
        }
        if grid.numbers_locked {
            return Err(PoolError::NumbersLocked);
        }
        Ok(())
    }
}

/// Fails with `ProtectedGrid` for the default grid
pub fn ensure_deletable(id: GridId) -> Result<()> {
    if id == DEFAULT_GRID_ID {
        return Err(PoolError::ProtectedGrid(id));
    }
    Ok(())
}

/// Values given to freshly created grids
#[derive(Debug, Clone)]
pub struct GridDefaults {
    pub squares_limit: u32,
    pub price_per_square: Decimal,
    pub default_grid_name: String,
}

impl Default for GridDefaults {
    fn default() -> Self {
        Self {
            squares_limit: 5,
            price_per_square: Decimal::new(1000, 2),
            default_grid_name: "Main Grid".to_string(),
        }
    }
}

/// Everything persisted per grid apart from its squares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub grid: Grid,
    pub settings: GridSettings,
}

impl GridState {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            settings: GridSettings::default(),
        }
    }
}

/// Row of the grid listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSummary {
    pub id: GridId,
    pub name: String,
    pub squares_sold: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(0, 0).is_ok());
        assert!(Coordinate::new(9, 9).is_ok());
        assert!(matches!(
            Coordinate::new(10, 0),
            Err(PoolError::InvalidCoordinate { row: 10, col: 0 })
        ));
        assert!(Coordinate::new(0, -1).is_err());
    }

    #[test]
    fn test_coordinate_deserialize_rejects_out_of_range() {
        let ok: Coordinate = serde_json::from_str(r#"{"row": 3, "col": 7}"#).unwrap();
        assert_eq!((ok.row(), ok.col()), (3, 7));
        assert!(serde_json::from_str::<Coordinate>(r#"{"row": 3, "col": 12}"#).is_err());
    }

    #[test]
    fn test_all_coordinates_row_major() {
        let all: Vec<Coordinate> = Coordinate::all().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].index(), 0);
        assert_eq!(all[37], Coordinate::new(3, 7).unwrap());
    }

    #[test]
    fn test_digits_must_be_permutation() {
        assert!(Digits::new([3, 7, 0, 1, 2, 4, 5, 6, 8, 9]).is_ok());
        assert!(Digits::new([3, 3, 0, 1, 2, 4, 5, 6, 8, 9]).is_err());
        assert!(Digits::new([10, 7, 0, 1, 2, 4, 5, 6, 8, 9]).is_err());
        assert!(Digits::try_from(vec![0, 1, 2]).is_err());
    }

    #[test]
    fn test_grid_auto_name() {
        let defaults = GridDefaults::default();
        let grid = Grid::new(4, Some("   "), &defaults, Utc::now());
        assert_eq!(grid.name, "Grid 4");
        let grid = Grid::new(5, Some(" Office "), &defaults, Utc::now());
        assert_eq!(grid.name, "Office");
    }

    #[test]
    fn test_claim_gate() {
        let now = Utc::now();
        let mut grid = Grid::new(2, None, &GridDefaults::default(), now);
        let public = ClaimGate::Public { now };
        assert!(public.check(&grid).is_ok());

        grid.numbers_locked = true;
        assert!(matches!(public.check(&grid), Err(PoolError::NumbersLocked)));
        assert!(ClaimGate::Open.check(&grid).is_ok());

        grid.numbers_locked = false;
        grid.claim_deadline = Some(now);
        assert!(matches!(public.check(&grid), Err(PoolError::DeadlinePassed)));
        assert!(ClaimGate::Open.check(&grid).is_ok());
    }

    #[test]
    fn test_default_grid_is_protected() {
        assert!(matches!(ensure_deletable(1), Err(PoolError::ProtectedGrid(1))));
        assert!(ensure_deletable(2).is_ok());
    }
}
