//! perfcheck binary
//!
//! Main entry point for judging regression runs

use clap::Parser;
use perfcheck::cli::{App, Cli};
use perfcheck::logging::LoggingSystem;
use perfcheck::Config;
use std::process::ExitCode;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(Some(path)),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(site) = &cli.site {
        config.site.path = site.clone();
    }

    let mut logging = LoggingSystem::new(config.clone());
    if let Err(e) = logging.initialize().await {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(2);
    }
    debug!("Site configuration: {}", config.site.path.display());

    let app = match App::new(config, cli.json) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to build the check registry: {}", e);
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    let code = match app.execute(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    };

    if let Err(e) = logging.shutdown().await {
        eprintln!("Failed to flush logs: {e}");
    }
    code
}
