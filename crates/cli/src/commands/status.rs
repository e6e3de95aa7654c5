//! One-shot agent status command

use anyhow::{Context, Result};
use colored::Colorize;

use loadtest_lib::config::{AgentConfig, ControllerConfig, LoadTestConfig};
use loadtest_lib::coordinator::LoadAgent;

use crate::output::{color_state, OutputFormat};

/// Fetch and print the status of a single agent
pub async fn show_status(api_url: &str, id: &str, format: OutputFormat) -> Result<()> {
    let config = AgentConfig {
        id: id.to_string(),
        api_url: api_url.to_string(),
        load_test: LoadTestConfig::default(),
        controller: ControllerConfig::default(),
    };
    config.validate().context("invalid agent address")?;

    let agent = LoadAgent::new(config).context("failed to build agent client")?;
    let status = agent
        .fetch_status()
        .await
        .with_context(|| format!("failed to fetch status of agent {id}"))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(40));
            println!("Agent:        {}", id.cyan());
            println!("State:        {}", color_state(status.state));
            println!("Active Users: {}", status.active_users);
            println!("Errors:       {}", status.num_errors);
        }
    }

    Ok(())
}
