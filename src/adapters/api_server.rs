use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::adapters::{EspnScoreFeed, MemoryStore, PostgresStore};
use crate::api::{create_router, AppState};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::Result;
use crate::persistence::PoolStore;
use crate::services::{LiveScoreSync, PoolService};

/// Postgres when a database URL is configured, otherwise an in-memory store
pub async fn open_store(config: &AppConfig, clock: &dyn Clock) -> Result<Arc<dyn PoolStore>> {
    match config.database.url.as_deref() {
        Some(url) => {
            let store = PostgresStore::new(url, config.database.max_connections).await?;
            store.migrate().await?;
            info!("Using PostgreSQL store");
            Ok(Arc::new(store))
        }
        None => {
            info!("No database configured, using in-memory store");
            Ok(Arc::new(MemoryStore::new(
                &config.pool.grid_defaults(),
                clock.now(),
            )))
        }
    }
}

/// Wire the store, services and live feed into the handler state
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, clock.as_ref()).await?;
    let service = Arc::new(PoolService::new(
        store,
        clock,
        config.pool.grid_defaults(),
    ));
    let feed = EspnScoreFeed::new(
        &config.live_sync.scoreboard_url,
        config.live_sync.fetch_timeout(),
    )?;
    let live = Arc::new(LiveScoreSync::new(
        Arc::new(feed),
        Arc::clone(&service),
        config.live_sync.sync_config(),
    ));
    Ok(AppState::new(service, live, config.admin.clone()))
}

/// Serve the API until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = TcpListener::bind((host, port)).await?;
    info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
