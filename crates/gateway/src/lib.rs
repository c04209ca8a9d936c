//! # Game Gateway - Main Entry Point
//!
//! Runs the session router between game clients and world servers. This entry
//! point handles CLI parsing, configuration loading, and application lifecycle
//! management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! gateway
//!
//! # Specify custom configuration
//! gateway --config production.toml
//!
//! # Override specific settings
//! gateway --bind 0.0.0.0:8085 --realm-id 2 --log-level debug
//!
//! # JSON logging for production
//! gateway --json-logs
//! ```
//!
//! ## Configuration
//!
//! The gateway loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM start a graceful shutdown; a second signal exits
//! immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

pub use config::{LoggingSettings, RecoverySettings, RedirectSettings, ServerSettings, ServiceSettings};

/// Parses arguments, sets up logging and runs the application to completion.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging needs the configured level before anything else is loaded.
    let mut logging = AppConfig::load_from_file(&args.config_path)
        .await
        .map(|config| config.logging)
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
