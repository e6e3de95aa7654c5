//! Typed errors for the coordinator, cluster, monitor and engine

use thiserror::Error;

use crate::models::AgentState;

/// Errors from a single agent HTTP call
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent API returned 404 for this agent id
    #[error("agent not found")]
    NotFound,
    /// The agent API returned an unexpected HTTP status code
    #[error("bad response status code {0}")]
    BadStatus(u16),
    /// The response envelope carried a non-empty error field
    #[error("agent api error: {0}")]
    Api(String),
    /// The amount for an add/remove operation must be positive
    #[error("user amount must be greater than zero")]
    InvalidAmount,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors from cluster-wide operations
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Every agent failed to start; the caller must not proceed
    #[error("cluster unavailable: no live agents")]
    Unavailable,
    /// Some agents failed during a dispatch; the operation was
    /// applied to the agents that succeeded
    #[error("dispatch partially applied, failed agents: {0:?}")]
    PartialDispatch(Vec<String>),
    #[error("failed to build client for agent {id}: {source}")]
    Client {
        id: String,
        #[source]
        source: AgentError,
    },
}

/// Errors from the metrics backend
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid prometheus url: {0}")]
    InvalidUrl(String),
    #[error("metrics backend returned status code {0}")]
    BadStatus(u16),
    #[error("metrics backend error: {0}")]
    Backend(String),
    /// The instant vector was empty; the query is skipped for this tick
    #[error("query returned no samples")]
    EmptyResult,
    #[error("malformed query response: {0}")]
    Malformed(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors from the performance monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Errors from the local load-test engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user amount must be greater than zero")]
    InvalidAmount,
    #[error("engine is not running (state: {0})")]
    NotRunning(AgentState),
    #[error("cannot {op} from state {from}")]
    InvalidTransition { op: &'static str, from: AgentState },
    #[error("maximum number of active users reached ({limit})")]
    MaxUsersReached { limit: usize },
    #[error("no active users to remove")]
    NoActiveUsers,
}

/// Configuration validation and loading errors; always fatal at
/// construction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}
