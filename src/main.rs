use tracing::{info, warn};

use journey_genie::config::Config;
use journey_genie::database::Database;
use journey_genie::logging;
use journey_genie::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    logging::init();

    let config = Config::load()
        .unwrap_or_else(|e| {
            warn!("Failed to load configuration: {e}. Using defaults.");
            Config::default()
        })
        .with_env_overrides();

    info!("Starting journeyGenie v{}", env!("CARGO_PKG_VERSION"));
    info!("Server configuration: {}", config.server_address());

    let database = Database::connect(&config.database.url, config.database.max_connections).await?;
    database.migrate().await?;

    let state = AppState::new(config, database)?;
    server::serve(state).await?;

    Ok(())
}
