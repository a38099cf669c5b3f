use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{GridState, Quarter, QuarterLocks, Scores, MAX_SQUARES_LIMIT};
use crate::error::{PoolError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSettings {
    pub name: String,
    pub color: String,
    pub logo_url: Option<String>,
}

/// Prize percentages per quarter; whatever is left goes to charity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSplit {
    pub prize_q1: Decimal,
    pub prize_q2: Decimal,
    pub prize_q3: Decimal,
    pub prize_q4: Decimal,
}

impl Default for PrizeSplit {
    fn default() -> Self {
        let share = Decimal::from(20);
        Self {
            prize_q1: share,
            prize_q2: share,
            prize_q3: share,
            prize_q4: share,
        }
    }
}

impl PrizeSplit {
    pub fn percent(&self, quarter: Quarter) -> Decimal {
        match quarter {
            Quarter::Q1 => self.prize_q1,
            Quarter::Q2 => self.prize_q2,
            Quarter::Q3 => self.prize_q3,
            Quarter::Q4 => self.prize_q4,
        }
    }

    pub fn total(&self) -> Decimal {
        self.prize_q1 + self.prize_q2 + self.prize_q3 + self.prize_q4
    }

    /// Charity share, clamped at zero for display
    pub fn charity_percent(&self) -> Decimal {
        (Decimal::ONE_HUNDRED - self.total()).max(Decimal::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        if Quarter::ALL.iter().any(|q| self.percent(*q) < Decimal::ZERO) {
            return Err(PoolError::validation("Prize percentages cannot be negative"));
        }
        if self.total() > Decimal::ONE_HUNDRED {
            return Err(PoolError::validation(format!(
                "Prize percentages add up to {}%, which is more than 100%",
                self.total()
            )));
        }
        Ok(())
    }

    /// Quarter payout for a pot of `pot`
    pub fn payout(&self, quarter: Quarter, pot: Decimal) -> Decimal {
        (pot * self.percent(quarter) / Decimal::ONE_HUNDRED).round_dp(2)
    }

    pub fn charity_amount(&self, pot: Decimal) -> Decimal {
        (pot * self.charity_percent() / Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub text: String,
    pub enabled: bool,
}

/// Per-grid display, prize, score and live-sync settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub team1: TeamSettings,
    pub team2: TeamSettings,
    pub prizes: PrizeSplit,
    pub scores: Scores,
    pub quarter_locks: QuarterLocks,
    pub show_winners: bool,
    pub banner: Banner,
    pub live_sync_enabled: bool,
    /// Scoreboard event to follow; matched by team names when absent
    pub live_game_id: Option<String>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            team1: TeamSettings {
                name: "Team 1".to_string(),
                color: "#1f4e9c".to_string(),
                logo_url: None,
            },
            team2: TeamSettings {
                name: "Team 2".to_string(),
                color: "#b3262e".to_string(),
                logo_url: None,
            },
            prizes: PrizeSplit::default(),
            scores: Scores::default(),
            quarter_locks: QuarterLocks::default(),
            show_winners: true,
            banner: Banner::default(),
            live_sync_enabled: false,
            live_game_id: None,
        }
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Present-but-null deserializes to `Some(None)`
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Field-level admin configuration update.
///
/// Every field is optional; absent fields are left untouched. Validation
/// runs against the merged result, so a patch that only moves `prize_q1`
/// is still checked against the other three percentages.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigPatch {
    pub name: Option<String>,
    pub squares_limit: Option<u32>,
    pub price_per_square: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub claim_deadline: Option<Option<DateTime<Utc>>>,
    pub team1_name: Option<String>,
    pub team2_name: Option<String>,
    pub team1_color: Option<String>,
    pub team2_color: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub team1_logo: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub team2_logo: Option<Option<String>>,
    pub prize_q1: Option<Decimal>,
    pub prize_q2: Option<Decimal>,
    pub prize_q3: Option<Decimal>,
    pub prize_q4: Option<Decimal>,
    pub show_winners: Option<bool>,
    pub banner_text: Option<String>,
    pub banner_enabled: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub live_game_id: Option<Option<String>>,
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ConfigPatch {
    /// Names of the fields this patch sets, for audit details
    pub fn field_names(&self) -> Vec<&'static str> {
        [
            ("name", self.name.is_some()),
            ("squares_limit", self.squares_limit.is_some()),
            ("price_per_square", self.price_per_square.is_some()),
            ("claim_deadline", self.claim_deadline.is_some()),
            ("team1_name", self.team1_name.is_some()),
            ("team2_name", self.team2_name.is_some()),
            ("team1_color", self.team1_color.is_some()),
            ("team2_color", self.team2_color.is_some()),
            ("team1_logo", self.team1_logo.is_some()),
            ("team2_logo", self.team2_logo.is_some()),
            ("prize_q1", self.prize_q1.is_some()),
            ("prize_q2", self.prize_q2.is_some()),
            ("prize_q3", self.prize_q3.is_some()),
            ("prize_q4", self.prize_q4.is_some()),
            ("show_winners", self.show_winners.is_some()),
            ("banner_text", self.banner_text.is_some()),
            ("banner_enabled", self.banner_enabled.is_some()),
            ("live_game_id", self.live_game_id.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Apply to `state`; on error `state` is left unchanged
    pub fn apply(&self, state: &mut GridState) -> Result<bool> {
        let mut next = state.clone();
        let grid = &mut next.grid;
        let settings = &mut next.settings;

        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(PoolError::validation("Grid name cannot be empty"));
            }
            grid.name = name.to_string();
        }
        if let Some(limit) = self.squares_limit {
            if !(1..=MAX_SQUARES_LIMIT).contains(&limit) {
                return Err(PoolError::validation(format!(
                    "Squares limit must be between 1 and {}",
                    MAX_SQUARES_LIMIT
                )));
            }
            grid.squares_limit = limit;
        }
        if let Some(price) = self.price_per_square {
            if price < Decimal::ZERO {
                return Err(PoolError::validation("Price per square cannot be negative"));
            }
            grid.price_per_square = price;
        }
        if let Some(deadline) = self.claim_deadline {
            grid.claim_deadline = deadline;
        }

        for (team, name, color, logo) in [
            (&mut settings.team1, &self.team1_name, &self.team1_color, &self.team1_logo),
            (&mut settings.team2, &self.team2_name, &self.team2_color, &self.team2_logo),
        ] {
            if let Some(name) = name {
                let name = name.trim();
                if name.is_empty() {
                    return Err(PoolError::validation("Team name cannot be empty"));
                }
                team.name = name.to_string();
            }
            if let Some(color) = color {
                let color = color.trim();
                if !is_hex_color(color) {
                    return Err(PoolError::validation(format!(
                        "Team color must look like #RRGGBB, got {}",
                        color
                    )));
                }
                team.color = color.to_lowercase();
            }
            if let Some(logo) = logo {
                team.logo_url = blank_to_none(logo);
            }
        }

        let prizes = &mut settings.prizes;
        if let Some(p) = self.prize_q1 {
            prizes.prize_q1 = p;
        }
        if let Some(p) = self.prize_q2 {
            prizes.prize_q2 = p;
        }
        if let Some(p) = self.prize_q3 {
            prizes.prize_q3 = p;
        }
        if let Some(p) = self.prize_q4 {
            prizes.prize_q4 = p;
        }
        prizes.validate()?;

        if let Some(show) = self.show_winners {
            settings.show_winners = show;
        }
        if let Some(text) = &self.banner_text {
            settings.banner.text = text.trim().to_string();
        }
        if let Some(enabled) = self.banner_enabled {
            settings.banner.enabled = enabled;
        }
        if let Some(game_id) = &self.live_game_id {
            settings.live_game_id = blank_to_none(game_id);
        }

        let changed = next != *state;
        *state = next;
        Ok(changed)
    }
}
