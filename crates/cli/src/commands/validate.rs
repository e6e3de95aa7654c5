//! Configuration check command

use std::path::Path;

use anyhow::{Context, Result};

use loadtest_lib::config::CoordinatorConfig;

use crate::output::print_success;

/// Load and validate a coordinator configuration file
pub fn check_config(config_path: &Path) -> Result<()> {
    let config = CoordinatorConfig::load(Some(config_path))
        .with_context(|| format!("configuration {} is invalid", config_path.display()))?;

    print_success(&format!(
        "configuration is valid: {} agents, {} queries",
        config.cluster.agents.len(),
        config.monitor.queries.len()
    ));
    Ok(())
}
