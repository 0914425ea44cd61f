//! services/client/src/bin/lexilearn.rs

use clap::Parser;
use client_lib::{cli::Cli, config::Config, error::ClientError, state::AppState};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Parse Arguments, Load Configuration & Set Up Logging ---
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    debug!(
        api_url = %config.api_url,
        storage = %config.storage_path.display(),
        "Configuration loaded"
    );

    // --- 2. Wire Adapters & Shared State ---
    let state = AppState::new(config)?;

    // --- 3. Run the Command ---
    if let Err(e) = client_lib::cli::run(cli, &state).await {
        debug!("Command failed: {:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
