//! Core data models shared by the coordinator and the load agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a load agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Agent has been created but is not yet driving users
    #[default]
    Created,
    /// Agent is running and its users can be scaled
    Running,
    /// Agent has been stopped and its users torn down
    Stopped,
    /// Agent failed to start or was marked dead by the coordinator
    Failed,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Created => write!(f, "created"),
            AgentState::Running => write!(f, "running"),
            AgentState::Stopped => write!(f, "stopped"),
            AgentState::Failed => write!(f, "failed"),
        }
    }
}

/// Status reported by a single load agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Number of simulated users currently active on the agent
    pub active_users: usize,
    /// Number of user action errors accumulated since start
    pub num_errors: i64,
    /// Current lifecycle state
    pub state: AgentState,
}

/// Aggregate status over all live agents in a cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStatus {
    pub active_users: usize,
    pub num_errors: i64,
}

/// One performance sample emitted by the monitor
#[derive(Debug, Clone, Copy)]
pub struct PerfSample {
    /// Whether any alert-bearing query crossed its threshold
    pub alert: bool,
    pub timestamp: DateTime<Utc>,
}

/// Uniform response envelope for the agent HTTP API
///
/// A non-empty `error` field signals a failure even when the HTTP
/// status code is 2xx.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    /// Successful response carrying the agent's latest status
    pub fn ok(status: AgentStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            error: None,
        }
    }

    /// Failure response with the error field populated
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: None,
            error: Some(message.into()),
        }
    }
}

/// Request body for `POST /loadagent/create`
///
/// The controller configuration is a tagged variant, so the
/// discriminator travels explicitly on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub load_test_config: crate::config::LoadTestConfig,
    pub controller_config: crate::config::ControllerConfig,
}
