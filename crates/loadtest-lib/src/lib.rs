//! Library for coordinating distributed load tests
//!
//! This crate provides the core functionality for:
//! - Driving a cluster of remote load agents over HTTP
//! - Monitoring the target's health through a Prometheus backend
//! - The feedback-control loop estimating supported users
//! - The local load engine behind each agent
//! - Metrics exposition

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod models;
pub mod monitor;
pub mod observability;

pub use config::{AgentConfig, ClusterConfig, CoordinatorConfig, MonitorConfig};
pub use coordinator::{Coordinator, LoadAgent, LoadAgentCluster, RunOutcome};
pub use engine::LoadTester;
pub use error::{
    AgentError, ClusterError, ConfigError, CoordinatorError, EngineError, MonitorError, QueryError,
};
pub use models::*;
pub use monitor::Monitor;
pub use observability::LoadTestMetrics;
