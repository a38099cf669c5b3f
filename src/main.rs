use clap::Parser;
use squarepool::adapters::{build_state, start_api_server, PostgresStore};
use squarepool::cli::{Cli, Commands};
use squarepool::config::AppConfig;
use squarepool::domain::{AdminGrant, GridId};
use squarepool::error::{PoolError, Result};
use squarepool::logging::{init_logging, init_logging_simple};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    match cli.command() {
        Commands::Serve => {
            init_logging(&config.logging);
            run_server(&config).await?;
        }
        Commands::Migrate => {
            init_logging_simple();
            run_migrations(&config).await?;
        }
        Commands::Live { grid } => {
            init_logging_simple();
            show_live_scores(&config, grid).await?;
        }
    }

    Ok(())
}

async fn run_server(config: &AppConfig) -> Result<()> {
    let state = build_state(config).await?;
    let live = state.live.clone();

    // Bootstrap grant for schedules that were enabled before the restart
    let resumed = live.resume(&AdminGrant::issue()).await?;
    if resumed > 0 {
        info!("Resumed live sync for {} grid(s)", resumed);
    }

    start_api_server(
        state,
        &config.server.host,
        config.server.port,
        shutdown_signal(),
    )
    .await?;

    info!("Shutting down...");
    live.shutdown();
    Ok(())
}

async fn run_migrations(config: &AppConfig) -> Result<()> {
    let url = config.database.url.as_deref().ok_or_else(|| {
        PoolError::Config(config::ConfigError::NotFound("database.url".to_string()))
    })?;
    let store = PostgresStore::new(url, config.database.max_connections).await?;
    store.migrate().await?;
    println!("Migrations applied");
    Ok(())
}

async fn show_live_scores(config: &AppConfig, grid: GridId) -> Result<()> {
    let state = build_state(config).await?;
    let result = state.live.fetch_live(grid).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
