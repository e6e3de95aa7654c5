//! Load-test agent server
//!
//! Runs next to the target under test, exposing the `/loadagent` API
//! the coordinator drives. Simulated users are managed by the local
//! engine in `loadtest-lib`.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lt_agent::{api, config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting load-test agent");

    let config = config::AgentServerConfig::load()?;
    info!(port = config.port, "Agent configured");

    let state = Arc::new(api::AppState::new());
    state.set_ready(true);

    let _server = tokio::spawn(api::serve(config.port, state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
