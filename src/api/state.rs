use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::AdminConfig;
use crate::services::{LiveScoreSync, PoolService};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PoolService>,

    pub live: Arc<LiveScoreSync>,

    /// Admin token and session cookie settings
    pub admin: Arc<AdminConfig>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<PoolService>, live: Arc<LiveScoreSync>, admin: AdminConfig) -> Self {
        Self {
            service,
            live,
            admin: Arc::new(admin),
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
