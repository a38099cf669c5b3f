use async_trait::async_trait;
use chrono::Utc;
use squarepool::{
    adapters::MemoryStore,
    clock::SystemClock,
    domain::{
        AdminGrant, GameQuery, GameStatus, GridDefaults, LiveGame, Quarter, ScoreFeed, SyncState,
        DEFAULT_GRID_ID,
    },
    error::FeedError,
    services::{LiveScoreSync, LiveSyncConfig, PoolService},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn final_game(team1_periods: Vec<u32>, team2_periods: Vec<u32>) -> LiveGame {
    LiveGame {
        event_id: "401547417".into(),
        team1_name: "Kansas City Chiefs".into(),
        team2_name: "San Francisco 49ers".into(),
        team1_score: team1_periods.iter().sum(),
        team2_score: team2_periods.iter().sum(),
        period: 4,
        clock: "0:00".into(),
        is_halftime: false,
        is_final: true,
        status: GameStatus::Final,
        team1_periods,
        team2_periods,
    }
}

/// Feed returning whatever game the test last set, after an optional delay
struct ScriptedFeed {
    game: Mutex<LiveGame>,
    delay: Duration,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFeed {
    fn new(game: LiveGame, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            game: Mutex::new(game),
            delay,
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn set_game(&self, game: LiveGame) {
        *self.game.lock().expect("feed lock") = game;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreFeed for ScriptedFeed {
    async fn fetch_game(&self, _query: &GameQuery) -> Result<LiveGame, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.game.lock().expect("feed lock").clone())
    }
}

struct Harness {
    pool: Arc<PoolService>,
    live: Arc<LiveScoreSync>,
    feed: Arc<ScriptedFeed>,
}

fn harness(feed: Arc<ScriptedFeed>, config: LiveSyncConfig) -> Harness {
    let defaults = GridDefaults::default();
    let store = Arc::new(MemoryStore::new(&defaults, Utc::now()));
    let pool = Arc::new(PoolService::new(store, Arc::new(SystemClock), defaults));
    let live = Arc::new(LiveScoreSync::new(
        feed.clone(),
        Arc::clone(&pool),
        config,
    ));
    Harness { pool, live, feed }
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn schedule_fetches_once_per_interval() {
    let h = harness(
        ScriptedFeed::new(final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]), Duration::ZERO),
        LiveSyncConfig::default(),
    );
    let admin = AdminGrant::issue();

    h.live.start_auto(&admin, DEFAULT_GRID_ID).await.expect("start");
    assert!(h.live.is_scheduled(DEFAULT_GRID_ID));

    sleep_secs(1).await;
    assert_eq!(h.feed.fetches(), 1);
    sleep_secs(30).await;
    assert_eq!(h.feed.fetches(), 2);
    sleep_secs(30).await;
    assert_eq!(h.feed.fetches(), 3);

    let state = h.pool.grid_state(DEFAULT_GRID_ID).await.expect("grid");
    assert_eq!(state.settings.scores.get(Quarter::Q1).pair(), Some((7, 0)));
    assert_eq!(state.settings.scores.get(Quarter::Q4).pair(), Some((17, 20)));
    assert_eq!(h.live.sync_state(DEFAULT_GRID_ID), SyncState::Available);
}

#[tokio::test(start_paused = true)]
async fn stopping_the_schedule_stops_fetching() {
    let h = harness(
        ScriptedFeed::new(final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]), Duration::ZERO),
        LiveSyncConfig::default(),
    );
    let admin = AdminGrant::issue();

    h.live.start_auto(&admin, DEFAULT_GRID_ID).await.expect("start");
    sleep_secs(31).await;
    assert_eq!(h.feed.fetches(), 2);

    h.live.stop_auto(&admin, DEFAULT_GRID_ID).await.expect("stop");
    assert!(!h.live.is_scheduled(DEFAULT_GRID_ID));
    sleep_secs(300).await;
    assert_eq!(h.feed.fetches(), 2);
    assert_eq!(h.live.sync_state(DEFAULT_GRID_ID), SyncState::Idle);

    let state = h.pool.grid_state(DEFAULT_GRID_ID).await.expect("grid");
    assert!(!state.settings.live_sync_enabled);
}

#[tokio::test(start_paused = true)]
async fn locked_quarter_is_never_resynced() {
    let h = harness(
        ScriptedFeed::new(final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]), Duration::ZERO),
        LiveSyncConfig::default(),
    );
    let admin = AdminGrant::issue();

    h.live.start_auto(&admin, DEFAULT_GRID_ID).await.expect("start");
    sleep_secs(1).await;
    h.pool
        .set_quarter_lock(&admin, DEFAULT_GRID_ID, Quarter::Q1, true)
        .await
        .expect("lock q1");

    // Upstream corrects the first quarter after it was locked
    h.feed.set_game(final_game(vec![10, 0, 7, 0], vec![0, 10, 3, 14]));
    sleep_secs(30).await;
    assert_eq!(h.feed.fetches(), 2);

    let state = h.pool.grid_state(DEFAULT_GRID_ID).await.expect("grid");
    assert_eq!(state.settings.scores.get(Quarter::Q1).pair(), Some((7, 0)));
    assert_eq!(state.settings.scores.get(Quarter::Q4).pair(), Some((17, 27)));
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_is_never_overlapped() {
    let h = harness(
        ScriptedFeed::new(
            final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]),
            Duration::from_secs(45),
        ),
        LiveSyncConfig {
            poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
        },
    );
    let admin = AdminGrant::issue();

    h.live.start_auto(&admin, DEFAULT_GRID_ID).await.expect("start");
    sleep_secs(200).await;

    assert_eq!(h.feed.max_in_flight.load(Ordering::SeqCst), 1);
    // Ticks at 30, 90 and 150 land while a fetch is outstanding
    assert!(h.feed.fetches() <= 4, "fetches: {}", h.feed.fetches());
    h.live.shutdown();
}

#[tokio::test(start_paused = true)]
async fn stopped_schedule_discards_in_flight_result() {
    let h = harness(
        ScriptedFeed::new(
            final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]),
            Duration::from_secs(10),
        ),
        LiveSyncConfig {
            poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
        },
    );
    let admin = AdminGrant::issue();

    h.live.start_auto(&admin, DEFAULT_GRID_ID).await.expect("start");
    sleep_secs(1).await;
    assert_eq!(h.feed.fetches(), 1);
    h.live.stop_auto(&admin, DEFAULT_GRID_ID).await.expect("stop");

    sleep_secs(20).await;
    let state = h.pool.grid_state(DEFAULT_GRID_ID).await.expect("grid");
    assert_eq!(state.settings.scores.get(Quarter::Q4).pair(), None);
    assert_eq!(h.live.sync_state(DEFAULT_GRID_ID), SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_is_reported_as_fetch_failed() {
    let h = harness(
        ScriptedFeed::new(
            final_game(vec![7, 3, 7, 0], vec![0, 10, 3, 7]),
            Duration::from_secs(20),
        ),
        LiveSyncConfig {
            poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
        },
    );

    let result = h.live.fetch_live(DEFAULT_GRID_ID).await.expect("fetch");
    assert_eq!(result.error_type.as_deref(), Some("fetch_failed"));
    assert!(result.game.is_none());
    assert!(result.cached_scores.is_some());
}
