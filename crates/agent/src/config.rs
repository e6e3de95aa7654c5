//! Agent server configuration

use anyhow::Result;
use serde::Deserialize;

/// Agent server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentServerConfig {
    /// Port the `/loadagent` API listens on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    4000
}

impl AgentServerConfig {
    /// Load configuration from `LT_AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LT_AGENT"))
            .build()?;

        Ok(config
            .try_deserialize()
            .unwrap_or_else(|_| AgentServerConfig {
                port: default_port(),
            }))
    }
}
