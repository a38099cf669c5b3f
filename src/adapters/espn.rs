//! ESPN scoreboard feed
//!
//! Reads the public scoreboard JSON (no API key) and turns the grid's game
//! into a [`LiveGame`] oriented to the grid's team1/team2.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::{GameQuery, GameStatus, LiveGame, ScoreFeed};
use crate::error::{FeedError, PoolError, Result};

pub const DEFAULT_SCOREBOARD_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard";

// ── ESPN JSON deserialization structs ────────────────────────────

#[derive(Debug, Deserialize)]
struct EspnResponse {
    #[serde(default)]
    events: Vec<EspnEvent>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: String,
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetition {
    competitors: Vec<EspnCompetitor>,
    status: EspnStatus,
}

#[derive(Debug, Deserialize)]
struct EspnCompetitor {
    team: EspnTeam,
    #[serde(rename = "homeAway")]
    home_away: String,
    score: Option<String>,
    linescores: Option<Vec<EspnLinescore>>,
}

#[derive(Debug, Deserialize)]
struct EspnTeam {
    abbreviation: String,
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "shortDisplayName", default)]
    short_display_name: Option<String>,
}

impl EspnTeam {
    fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        if wanted.is_empty() {
            return false;
        }
        [
            Some(self.display_name.as_str()),
            Some(self.abbreviation.as_str()),
            self.short_display_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|name| name.eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Deserialize)]
struct EspnLinescore {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    #[serde(default)]
    period: u8,
    #[serde(rename = "displayClock", default)]
    display_clock: String,
    #[serde(rename = "type")]
    status_type: EspnStatusType,
}

#[derive(Debug, Deserialize)]
struct EspnStatusType {
    state: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    completed: bool,
}

// ── Client ──────────────────────────────────────────────────────

/// ESPN live scoreboard client
pub struct EspnScoreFeed {
    http: reqwest::Client,
    scoreboard_url: String,
}

impl EspnScoreFeed {
    pub fn new(scoreboard_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PoolError::Http)?;
        Ok(Self {
            http,
            scoreboard_url: scoreboard_url.into(),
        })
    }

    fn select_event<'a>(data: &'a EspnResponse, query: &GameQuery) -> Option<&'a EspnEvent> {
        if let Some(id) = query.event_id.as_deref() {
            return data.events.iter().find(|e| e.id == id);
        }
        data.events.iter().find(|event| {
            event.competitions.first().is_some_and(|comp| {
                [&query.team1_name, &query.team2_name]
                    .into_iter()
                    .all(|name| comp.competitors.iter().any(|c| c.team.matches(name)))
            })
        })
    }

    fn parse_event(event: &EspnEvent, query: &GameQuery) -> Option<LiveGame> {
        let comp = event.competitions.first()?;
        let (home, away) = Self::split_competitors(&comp.competitors)?;

        // team1 is whichever side matches the grid's team1 name; home otherwise
        let (team1, team2) = if away.team.matches(&query.team1_name)
            || home.team.matches(&query.team2_name)
        {
            (away, home)
        } else {
            (home, away)
        };

        let status = &comp.status.status_type;
        let is_final = status.completed || status.state == "post";
        let is_halftime = !is_final && status.name == "STATUS_HALFTIME";
        let period = comp.status.period;

        Some(LiveGame {
            event_id: event.id.clone(),
            team1_name: team1.team.display_name.clone(),
            team2_name: team2.team.display_name.clone(),
            team1_score: Self::parse_score(team1),
            team2_score: Self::parse_score(team2),
            period,
            clock: comp.status.display_clock.clone(),
            is_halftime,
            is_final,
            status: GameStatus::derive(period, is_halftime, is_final),
            team1_periods: Self::parse_linescores(&team1.linescores),
            team2_periods: Self::parse_linescores(&team2.linescores),
        })
    }

    fn split_competitors(
        comps: &[EspnCompetitor],
    ) -> Option<(&EspnCompetitor, &EspnCompetitor)> {
        let home = comps.iter().find(|c| c.home_away == "home")?;
        let away = comps.iter().find(|c| c.home_away == "away")?;
        Some((home, away))
    }

    fn parse_score(competitor: &EspnCompetitor) -> u32 {
        competitor
            .score
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn parse_linescores(ls: &Option<Vec<EspnLinescore>>) -> Vec<u32> {
        match ls {
            Some(scores) => scores
                .iter()
                .map(|s| s.value.max(0.0).round() as u32)
                .collect(),
            None => vec![],
        }
    }

    fn game_from_response(
        data: &EspnResponse,
        query: &GameQuery,
    ) -> std::result::Result<LiveGame, FeedError> {
        Self::select_event(data, query)
            .and_then(|event| Self::parse_event(event, query))
            .ok_or(FeedError::NotFoundYet)
    }
}

#[async_trait]
impl ScoreFeed for EspnScoreFeed {
    async fn fetch_game(&self, query: &GameQuery) -> std::result::Result<LiveGame, FeedError> {
        let resp = self
            .http
            .get(&self.scoreboard_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FeedError::Other(format!("ESPN scoreboard request failed: {}", e)))?;

        let data: EspnResponse = resp
            .json()
            .await
            .map_err(|e| FeedError::Other(format!("ESPN scoreboard JSON parse failed: {}", e)))?;

        debug!("ESPN: scoreboard has {} events", data.events.len());
        Self::game_from_response(&data, query)
    }
}
