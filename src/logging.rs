use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "squarepool.log";

fn default_filter(level: &str) -> String {
    format!("{level},squarepool=debug,sqlx=warn")
}

/// Returns true when `dir` exists (or can be created) and accepts new files.
///
/// `tracing_appender::rolling::daily` panics if it cannot create the initial
/// file, so the directory is probed first.
fn log_dir_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".squarepool_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}

/// Install the global subscriber: console output, optional JSON, and an
/// optional daily rolling file.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let file_layer = config.dir.as_deref().and_then(|dir| {
        let path = Path::new(dir);
        match log_dir_writable(path) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(path, LOG_FILE_NAME);
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Lives for the whole process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, config.dir.as_deref()) {
        eprintln!("Logging to: {}/{}", dir, LOG_FILE_NAME);
    }
}

/// Minimal logging for one-shot CLI commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_keeps_sqlx_quiet() {
        assert_eq!(default_filter("warn"), "warn,squarepool=debug,sqlx=warn");
    }

    #[test]
    fn test_unwritable_dir_is_reported() {
        let file = std::env::temp_dir().join(format!("squarepool-log-{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();
        // A regular file cannot be used as a log directory
        assert!(log_dir_writable(&file).is_err());
        let _ = std::fs::remove_file(&file);
    }
}
