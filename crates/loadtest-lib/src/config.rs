//! Configuration for the coordinator, cluster, monitor and agents
//!
//! Records carry declarative defaults through serde and are validated
//! with `validate()` before any component is constructed. Validation
//! failures are fatal.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Top-level coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Cluster of load agents to drive
    pub cluster: ClusterConfig,
    /// Performance monitor settings
    pub monitor: MonitorConfig,
    /// Users added per increment action
    #[serde(default = "default_num_users_inc")]
    pub num_users_inc: usize,
    /// Users removed per decrement action
    #[serde(default = "default_num_users_dec")]
    pub num_users_dec: usize,
    /// Minimum gap between two actions, in seconds
    #[serde(default = "default_rest_time_sec")]
    pub rest_time_sec: u64,
    /// Absolute slope below which the active-user curve counts as flat
    #[serde(default = "default_stop_threshold")]
    pub stop_threshold: f64,
    /// Time window considered for the best-fit line, in seconds
    #[serde(default = "default_samples_time_range_sec")]
    pub samples_time_range_sec: u64,
}

fn default_num_users_inc() -> usize {
    8
}

fn default_num_users_dec() -> usize {
    8
}

fn default_rest_time_sec() -> u64 {
    2
}

fn default_stop_threshold() -> f64 {
    0.1
}

fn default_samples_time_range_sec() -> u64 {
    30 * 60
}

impl CoordinatorConfig {
    /// Load configuration from an optional file plus `LTC_*`
    /// environment overrides, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let raw = builder
            .add_source(config::Environment::with_prefix("LTC").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let cfg: CoordinatorConfig = raw
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_users_inc < 1 {
            return Err(invalid("num_users_inc must be at least 1"));
        }
        if self.num_users_dec < 1 {
            return Err(invalid("num_users_dec must be at least 1"));
        }
        if self.rest_time_sec < 1 {
            return Err(invalid("rest_time_sec must be at least 1"));
        }
        if self.stop_threshold <= 0.0 {
            return Err(invalid("stop_threshold must be positive"));
        }
        if self.samples_time_range_sec < 1 {
            return Err(invalid("samples_time_range_sec must be at least 1"));
        }
        self.cluster.validate()?;
        self.monitor.validate()?;
        if self.rest_time_sec * 1000 <= self.monitor.update_interval_ms {
            return Err(invalid(
                "rest_time_sec must be strictly greater than the monitor update interval",
            ));
        }
        Ok(())
    }

    pub fn rest_time(&self) -> Duration {
        Duration::from_secs(self.rest_time_sec)
    }

    pub fn samples_time_range(&self) -> Duration {
        Duration::from_secs(self.samples_time_range_sec)
    }
}

/// Cluster of load agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// One entry per remote agent; ids must be unique
    pub agents: Vec<AgentConfig>,
    /// Hard cap on the aggregate number of active users
    #[serde(default = "default_max_active_users")]
    pub max_active_users: usize,
}

fn default_max_active_users() -> usize {
    1000
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(invalid("cluster requires at least one agent"));
        }
        if self.max_active_users < 1 {
            return Err(invalid("max_active_users must be at least 1"));
        }
        let mut ids = HashSet::new();
        for agent in &self.agents {
            agent.validate()?;
            if !ids.insert(agent.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent id: {}",
                    agent.id
                )));
            }
        }
        Ok(())
    }
}

/// A single remote load agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable unique identifier for the agent
    pub id: String,
    /// Base URL of the agent's HTTP API
    pub api_url: String,
    /// Load-test settings shipped to the agent at create time
    #[serde(default)]
    pub load_test: LoadTestConfig,
    /// Simulated-user controller shipped to the agent at create time
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(invalid("agent id must not be empty"));
        }
        Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("agent {} api_url: {e}", self.id)))?;
        self.load_test.validate()?;
        self.controller.validate()
    }
}

/// Performance monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the Prometheus-compatible backend
    pub prometheus_url: String,
    /// Milliseconds between two monitor ticks
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Queries evaluated in declared order on every tick
    pub queries: Vec<Query>,
}

fn default_update_interval_ms() -> u64 {
    1000
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.prometheus_url)
            .map_err(|e| ConfigError::Invalid(format!("prometheus_url: {e}")))?;
        if self.update_interval_ms < 100 {
            return Err(invalid("update_interval_ms must be at least 100"));
        }
        if self.queries.is_empty() {
            return Err(invalid("monitor requires at least one query"));
        }
        if !self.queries.iter().any(|q| q.alert) {
            return Err(invalid("at least one query must be alert-bearing"));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// One metric query with its alert threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Human-readable description used in logs
    pub description: String,
    /// Instant query submitted to the backend
    pub query: String,
    /// The query alerts when its value is at or above this threshold
    pub threshold: f64,
    /// Whether crossing the threshold raises an alert
    #[serde(default)]
    pub alert: bool,
}

/// Load-test settings interpreted by the agent's local engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestConfig {
    #[serde(default)]
    pub users: UsersConfig,
}

impl LoadTestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users.max_active_users < 1 {
            return Err(invalid("users.max_active_users must be at least 1"));
        }
        if self.users.initial_active_users > self.users.max_active_users {
            return Err(invalid(
                "users.initial_active_users must not exceed users.max_active_users",
            ));
        }
        Ok(())
    }
}

/// Simulated-user population settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersConfig {
    /// Users started when the agent begins running. The coordinator
    /// forces this to zero and drives the count itself.
    #[serde(default)]
    pub initial_active_users: usize,
    /// Per-agent cap enforced by the engine
    #[serde(default = "default_agent_max_active_users")]
    pub max_active_users: usize,
}

fn default_agent_max_active_users() -> usize {
    2000
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            initial_active_users: 0,
            max_active_users: default_agent_max_active_users(),
        }
    }
}

/// Simulated-user controller configuration
///
/// Tagged variant; the discriminator is explicit on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControllerConfig {
    /// Fixed-cadence controller
    Simple(SimpleControllerConfig),
    /// Controller pacing users with a randomized idle spread
    Simulative(SimulControllerConfig),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::Simulative(SimulControllerConfig::default())
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ControllerConfig::Simple(c) => {
                if c.action_interval_ms < 1 {
                    return Err(invalid("action_interval_ms must be at least 1"));
                }
            }
            ControllerConfig::Simulative(c) => {
                if c.min_idle_time_ms < 1 {
                    return Err(invalid("min_idle_time_ms must be at least 1"));
                }
                if c.avg_idle_time_ms < c.min_idle_time_ms {
                    return Err(invalid(
                        "avg_idle_time_ms must be at least min_idle_time_ms",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleControllerConfig {
    /// Milliseconds between two actions of a simulated user
    #[serde(default = "default_action_interval_ms")]
    pub action_interval_ms: u64,
}

fn default_action_interval_ms() -> u64 {
    1000
}

impl Default for SimpleControllerConfig {
    fn default() -> Self {
        Self {
            action_interval_ms: default_action_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulControllerConfig {
    /// Lower bound for a user's idle time between actions
    #[serde(default = "default_min_idle_time_ms")]
    pub min_idle_time_ms: u64,
    /// Average idle time between actions
    #[serde(default = "default_avg_idle_time_ms")]
    pub avg_idle_time_ms: u64,
}

fn default_min_idle_time_ms() -> u64 {
    1000
}

fn default_avg_idle_time_ms() -> u64 {
    5000
}

impl Default for SimulControllerConfig {
    fn default() -> Self {
        Self {
            min_idle_time_ms: default_min_idle_time_ms(),
            avg_idle_time_ms: default_avg_idle_time_ms(),
        }
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            api_url: "http://localhost:4000".to_string(),
            load_test: LoadTestConfig::default(),
            controller: ControllerConfig::default(),
        }
    }

    fn query(alert: bool) -> Query {
        Query {
            description: "p99 latency".to_string(),
            query: "histogram_quantile(0.99, api_latency)".to_string(),
            threshold: 2.0,
            alert,
        }
    }

    fn coordinator_config() -> CoordinatorConfig {
        CoordinatorConfig {
            cluster: ClusterConfig {
                agents: vec![agent("agent-0"), agent("agent-1")],
                max_active_users: 100,
            },
            monitor: MonitorConfig {
                prometheus_url: "http://localhost:9090".to_string(),
                update_interval_ms: 1000,
                queries: vec![query(true)],
            },
            num_users_inc: default_num_users_inc(),
            num_users_dec: default_num_users_dec(),
            rest_time_sec: default_rest_time_sec(),
            stop_threshold: default_stop_threshold(),
            samples_time_range_sec: default_samples_time_range_sec(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(coordinator_config().validate().is_ok());
    }

    #[test]
    fn rejects_empty_agent_list() {
        let mut cfg = coordinator_config();
        cfg.cluster.agents.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let mut cfg = coordinator_config();
        cfg.cluster.agents = vec![agent("dup"), agent("dup")];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unparseable_api_url() {
        let mut cfg = coordinator_config();
        cfg.cluster.agents[0].api_url = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_increment() {
        let mut cfg = coordinator_config();
        cfg.num_users_inc = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_interval_below_floor() {
        let mut cfg = coordinator_config();
        cfg.monitor.update_interval_ms = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_rest_time_not_exceeding_interval() {
        let mut cfg = coordinator_config();
        cfg.rest_time_sec = 1;
        cfg.monitor.update_interval_ms = 1000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_queries_without_alert() {
        let mut cfg = coordinator_config();
        cfg.monitor.queries = vec![query(false)];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_queries() {
        let mut cfg = coordinator_config();
        cfg.monitor.queries.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn controller_config_round_trips_with_discriminator() {
        let cfg = ControllerConfig::Simulative(SimulControllerConfig {
            min_idle_time_ms: 500,
            avg_idle_time_ms: 2000,
        });
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["type"], "simulative");
        assert_eq!(json["minIdleTimeMs"], 500);

        let back: ControllerConfig = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ControllerConfig::Simulative(_)));
    }

    #[test]
    fn simulative_controller_rejects_avg_below_min() {
        let cfg = ControllerConfig::Simulative(SimulControllerConfig {
            min_idle_time_ms: 2000,
            avg_idle_time_ms: 500,
        });
        assert!(cfg.validate().is_err());
    }
}
