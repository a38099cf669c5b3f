use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::adapters::DEFAULT_SCOREBOARD_URL;
use crate::domain::{GridDefaults, MAX_SQUARES_LIMIT};
use crate::services::LiveSyncConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub live_sync: LiveSyncSettings,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; without one the pool runs on the in-memory store
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Values given to new grids
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub squares_limit: u32,
    pub price_per_square: Decimal,
    pub default_grid_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let defaults = GridDefaults::default();
        Self {
            squares_limit: defaults.squares_limit,
            price_per_square: defaults.price_per_square,
            default_grid_name: defaults.default_grid_name,
        }
    }
}

impl PoolConfig {
    pub fn grid_defaults(&self) -> GridDefaults {
        GridDefaults {
            squares_limit: self.squares_limit,
            price_per_square: self.price_per_square,
            default_grid_name: self.default_grid_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveSyncSettings {
    /// Auto-refresh period in seconds
    pub poll_interval_secs: u64,
    /// Per-request timeout in seconds
    pub fetch_timeout_secs: u64,
    pub scoreboard_url: String,
}

impl Default for LiveSyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            fetch_timeout_secs: 10,
            scoreboard_url: DEFAULT_SCOREBOARD_URL.to_string(),
        }
    }
}

impl LiveSyncSettings {
    pub fn sync_config(&self) -> LiveSyncConfig {
        LiveSyncConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Shared admin token; admin routes are closed while it is unset and
    /// `auth_required` is true
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub auth_required: bool,
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_secs: i64,
}

fn default_true() -> bool {
    true
}

fn default_cookie_max_age() -> i64 {
    8 * 60 * 60
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token: None,
            auth_required: true,
            cookie_secure: false,
            cookie_max_age_secs: default_cookie_max_age(),
        }
    }
}

impl AdminConfig {
    pub fn expected_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SQUARES_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SQUARES__ADMIN__TOKEN, etc.)
            .add_source(
                Environment::with_prefix("SQUARES")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SQUARES_LIMIT).contains(&self.pool.squares_limit) {
            return Err(ConfigError::Message(format!(
                "pool.squares_limit must be between 1 and {}",
                MAX_SQUARES_LIMIT
            )));
        }
        if self.pool.price_per_square.is_sign_negative() {
            return Err(ConfigError::Message(
                "pool.price_per_square must not be negative".to_string(),
            ));
        }
        if self.live_sync.poll_interval_secs == 0 || self.live_sync.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "live_sync intervals must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
