//! Live score sync
//!
//! Per-grid state machine around the external score feed:
//!
//! - one fetch in flight per grid; a tick that finds one outstanding is dropped
//! - every fetch is bounded by a timeout reported as `fetch_failed`
//! - eligible, unlocked quarters are committed as one idempotent batch
//! - the periodic task can be stopped at any time; a fetch already on the
//!   wire finishes but its result is thrown away

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::{
    eligible_quarters, AdminGrant, GameQuery, GridId, GridState, LiveGame, Quarter, QuarterLocks,
    ScoreFeed, Scores, ScoresPatch, SyncState,
};
use crate::error::{FeedError, PoolError, Result};
use crate::services::PoolService;

/// Configuration for live score sync
#[derive(Debug, Clone)]
pub struct LiveSyncConfig {
    /// Auto-refresh period
    pub poll_interval: Duration,
    /// Upper bound on a single feed request
    pub fetch_timeout: Duration,
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct GridSync {
    state: SyncState,
    game: Option<LiveGame>,
    error: Option<FeedError>,
    in_flight: bool,
    /// Bumped whenever auto-refresh stops; scheduled results from an older
    /// generation are discarded
    generation: u64,
}

/// Answer to "what is the live score", with the last good data on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFetchResult {
    pub game: Option<LiveGame>,
    pub cached_scores: Option<Scores>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub sync_state: SyncState,
    pub live_sync_enabled: bool,
    /// Quarters that would be written by a sync right now
    pub eligible_quarters: Vec<Quarter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub updated_quarters: Vec<Quarter>,
    pub game: LiveGame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Manual,
    Scheduled(u64),
}

fn game_query(state: &GridState) -> GameQuery {
    GameQuery {
        event_id: state.settings.live_game_id.clone(),
        team1_name: state.settings.team1.name.clone(),
        team2_name: state.settings.team2.name.clone(),
    }
}

/// Scores for every quarter the game has finished and nobody has locked
pub fn eligible_patch(game: &LiveGame, locks: &QuarterLocks) -> ScoresPatch {
    let mut patch = ScoresPatch::default();
    for quarter in eligible_quarters(game, locks) {
        if let Some(score) = game.score_at(quarter) {
            patch.insert(quarter, score);
        }
    }
    patch
}

pub struct LiveScoreSync {
    feed: Arc<dyn ScoreFeed>,
    pool: Arc<PoolService>,
    config: LiveSyncConfig,
    grids: DashMap<GridId, GridSync>,
    tasks: DashMap<GridId, JoinHandle<()>>,
}

impl LiveScoreSync {
    pub fn new(feed: Arc<dyn ScoreFeed>, pool: Arc<PoolService>, config: LiveSyncConfig) -> Self {
        Self {
            feed,
            pool,
            config,
            grids: DashMap::new(),
            tasks: DashMap::new(),
        }
    }

    pub fn sync_state(&self, grid_id: GridId) -> SyncState {
        self.grids
            .get(&grid_id)
            .map(|g| g.state)
            .unwrap_or_default()
    }

    pub fn is_scheduled(&self, grid_id: GridId) -> bool {
        self.tasks.contains_key(&grid_id)
    }

    fn generation(&self, grid_id: GridId) -> u64 {
        self.grids.get(&grid_id).map(|g| g.generation).unwrap_or(0)
    }

    fn transition(sync: &mut GridSync, grid_id: GridId, target: SyncState) {
        if sync.state == target {
            return;
        }
        if !sync.state.can_transition_to(target) {
            warn!(
                "Grid {}: unexpected live sync transition {} -> {}",
                grid_id, sync.state, target
            );
        }
        debug!("Grid {}: live sync {} -> {}", grid_id, sync.state, target);
        sync.state = target;
    }

    /// Claim the single fetch slot for the grid
    fn begin_fetch(&self, grid_id: GridId) -> bool {
        let mut sync = self.grids.entry(grid_id).or_default();
        if sync.in_flight {
            return false;
        }
        sync.in_flight = true;
        Self::transition(&mut sync, grid_id, SyncState::Fetching);
        true
    }

    /// Release the slot and record the result. Returns false when the result
    /// belongs to a stopped schedule and was dropped.
    fn finish_fetch(
        &self,
        grid_id: GridId,
        origin: Origin,
        outcome: &std::result::Result<LiveGame, FeedError>,
    ) -> bool {
        let mut sync = self.grids.entry(grid_id).or_default();
        sync.in_flight = false;

        if let Origin::Scheduled(generation) = origin {
            if generation != sync.generation {
                debug!("Grid {}: discarding result of stopped live sync", grid_id);
                Self::transition(&mut sync, grid_id, SyncState::Idle);
                return false;
            }
        }

        match outcome {
            Ok(game) => {
                sync.game = Some(game.clone());
                sync.error = None;
                Self::transition(&mut sync, grid_id, SyncState::Available);
            }
            Err(e) => {
                sync.error = Some(e.clone());
                Self::transition(&mut sync, grid_id, SyncState::Unavailable(e.into()));
            }
        }
        true
    }

    async fn fetch(&self, state: &GridState) -> std::result::Result<LiveGame, FeedError> {
        let query = game_query(state);
        match tokio::time::timeout(self.config.fetch_timeout, self.feed.fetch_game(&query)).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Other(format!(
                "timed out after {}s",
                self.config.fetch_timeout.as_secs()
            ))),
        }
    }

    fn snapshot(&self, state: &GridState) -> LiveFetchResult {
        let grid_id = state.grid.id;
        let sync = self.grids.get(&grid_id);
        let (sync_state, game, error) = match sync.as_deref() {
            Some(s) => (s.state, s.game.clone(), s.error.clone()),
            None => (SyncState::Idle, None, None),
        };
        drop(sync);

        let eligible = game
            .as_ref()
            .map(|g| eligible_quarters(g, &state.settings.quarter_locks))
            .unwrap_or_default();
        LiveFetchResult {
            cached_scores: (error.is_some() || game.is_none()).then_some(state.settings.scores),
            game: if error.is_some() { None } else { game },
            error_type: error.as_ref().map(|e| e.error_type().to_string()),
            error: error.map(|e| e.to_string()),
            sync_state,
            live_sync_enabled: state.settings.live_sync_enabled,
            eligible_quarters: eligible,
        }
    }

    /// Fetch the grid's game for display. While another fetch is outstanding
    /// this answers from the last result instead of starting a second one.
    pub async fn fetch_live(&self, grid_id: GridId) -> Result<LiveFetchResult> {
        let state = self.pool.grid_state(grid_id).await?;
        if self.begin_fetch(grid_id) {
            let outcome = self.fetch(&state).await;
            if let Err(e) = &outcome {
                warn!("Grid {}: live scores unavailable: {}", grid_id, e);
            }
            self.finish_fetch(grid_id, Origin::Manual, &outcome);
        }
        Ok(self.snapshot(&state))
    }

    /// Fetch and commit every eligible quarter now
    pub async fn sync_live_scores(
        &self,
        admin: &AdminGrant,
        grid_id: GridId,
    ) -> Result<SyncReport> {
        let state = self.pool.grid_state(grid_id).await?;
        if !self.begin_fetch(grid_id) {
            return Err(PoolError::FetchInProgress(grid_id));
        }
        let outcome = self.fetch(&state).await;
        self.finish_fetch(grid_id, Origin::Manual, &outcome);
        let game = outcome?;
        self.commit(admin, grid_id, game).await
    }

    async fn commit(
        &self,
        admin: &AdminGrant,
        grid_id: GridId,
        game: LiveGame,
    ) -> Result<SyncReport> {
        // Locks are re-checked inside the store; this only narrows the batch
        let state = self.pool.grid_state(grid_id).await?;
        let patch = eligible_patch(&game, &state.settings.quarter_locks);
        let updated_quarters = if patch.is_empty() {
            Vec::new()
        } else {
            self.pool.commit_synced_scores(admin, grid_id, patch).await?
        };
        Ok(SyncReport {
            updated_quarters,
            game,
        })
    }

    /// One scheduled refresh. A no-op when a fetch is outstanding, when the
    /// schedule was stopped, or when sync was switched off.
    async fn tick(&self, admin: &AdminGrant, grid_id: GridId, generation: u64) -> Result<()> {
        if self.generation(grid_id) != generation {
            return Ok(());
        }
        let state = self.pool.grid_state(grid_id).await?;
        if !state.settings.live_sync_enabled {
            return Ok(());
        }
        if !self.begin_fetch(grid_id) {
            debug!("Grid {}: fetch still in flight, skipping tick", grid_id);
            return Ok(());
        }

        let outcome = self.fetch(&state).await;
        if !self.finish_fetch(grid_id, Origin::Scheduled(generation), &outcome) {
            return Ok(());
        }
        match outcome {
            Ok(game) => {
                let report = self.commit(admin, grid_id, game).await?;
                if !report.updated_quarters.is_empty() {
                    info!(
                        "Grid {}: auto-sync updated {:?}",
                        grid_id, report.updated_quarters
                    );
                }
            }
            Err(e) => warn!("Grid {}: live scores unavailable: {}", grid_id, e),
        }
        Ok(())
    }

    fn spawn_schedule(self: &Arc<Self>, admin: AdminGrant, grid_id: GridId) {
        let generation = self.generation(grid_id);
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };
                // Separate task so stopping the schedule never cuts a fetch short
                tokio::spawn(async move {
                    if let Err(e) = this.tick(&admin, grid_id, generation).await {
                        warn!("Grid {}: live sync tick failed: {}", grid_id, e);
                    }
                });
            }
        });

        if let Some(previous) = self.tasks.insert(grid_id, handle) {
            previous.abort();
        }
        info!(
            "Grid {}: live sync scheduled every {}s",
            grid_id,
            period.as_secs()
        );
    }

    /// Enable auto-refresh for the grid and start polling
    pub async fn start_auto(self: &Arc<Self>, admin: &AdminGrant, grid_id: GridId) -> Result<()> {
        self.pool.set_live_sync(admin, grid_id, true).await?;
        self.spawn_schedule(*admin, grid_id);
        Ok(())
    }

    /// Deregister the schedule before anything else so no further tick
    /// fires, then persist the flag.
    pub async fn stop_auto(&self, admin: &AdminGrant, grid_id: GridId) -> Result<()> {
        self.cancel(grid_id);
        self.pool.set_live_sync(admin, grid_id, false).await?;
        Ok(())
    }

    fn cancel(&self, grid_id: GridId) {
        if let Some((_, handle)) = self.tasks.remove(&grid_id) {
            handle.abort();
            info!("Grid {}: live sync stopped", grid_id);
        }
        let mut sync = self.grids.entry(grid_id).or_default();
        sync.generation += 1;
        if !sync.in_flight {
            Self::transition(&mut sync, grid_id, SyncState::Idle);
        }
    }

    /// Immediate refresh when a viewer comes back after being throttled.
    /// Returns the current snapshot either way.
    pub async fn resync(&self, admin: &AdminGrant, grid_id: GridId) -> Result<LiveFetchResult> {
        let state = self.pool.grid_state(grid_id).await?;
        if state.settings.live_sync_enabled && self.is_scheduled(grid_id) {
            self.tick(admin, grid_id, self.generation(grid_id)).await?;
        }
        let state = self.pool.grid_state(grid_id).await?;
        Ok(self.snapshot(&state))
    }

    /// Restart schedules for grids that had sync enabled
    pub async fn resume(self: &Arc<Self>, admin: &AdminGrant) -> Result<usize> {
        let mut resumed = 0;
        for summary in self.pool.list_grids().await? {
            let state = self.pool.grid_state(summary.id).await?;
            if state.settings.live_sync_enabled && !self.is_scheduled(summary.id) {
                self.spawn_schedule(*admin, summary.id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Stop every schedule
    pub fn shutdown(&self) {
        let ids: Vec<GridId> = self.tasks.iter().map(|t| *t.key()).collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Forget state for a deleted grid
    pub fn forget(&self, grid_id: GridId) {
        self.cancel(grid_id);
        self.grids.remove(&grid_id);
    }
}
