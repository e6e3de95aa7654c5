//! Cluster of remote load agents
//!
//! Owns one client per configured agent, brings them up and tears
//! them down in parallel, and spreads increment/decrement requests
//! across the live agents by their last-known load.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::models::{AgentState, ClusterStatus};

use super::agent::LoadAgent;

/// Bound on the time spent destroying agents at shutdown
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

enum Dispatch {
    Increment,
    Decrement,
}

/// A pool of remote load agents addressed as one unit
pub struct LoadAgentCluster {
    agents: Vec<Arc<LoadAgent>>,
    max_active_users: usize,
    shut_down: AtomicBool,
}

impl LoadAgentCluster {
    /// Build clients for every configured agent. The configuration
    /// must already be validated.
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        let mut agents = Vec::with_capacity(config.agents.len());
        for agent_config in config.agents {
            let id = agent_config.id.clone();
            let agent = LoadAgent::new(agent_config)
                .map_err(|source| ClusterError::Client { id, source })?;
            agents.push(Arc::new(agent));
        }
        Ok(Self {
            agents,
            max_active_users: config.max_active_users,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Create and start every agent in parallel
    ///
    /// Agents that fail to start are marked failed and excluded from
    /// dispatch. Only when all of them fail is the cluster unusable.
    pub async fn run(&self) -> Result<(), ClusterError> {
        let results = join_all(self.agents.iter().map(|agent| async move {
            let res = async {
                agent.create().await?;
                agent.run().await
            }
            .await;
            (agent, res)
        }))
        .await;

        let mut live = 0;
        for (agent, res) in results {
            match res {
                Ok(()) => live += 1,
                Err(e) => {
                    warn!(agent_id = %agent.id(), error = %e, "agent failed to start");
                    agent.mark_failed();
                }
            }
        }

        if live == 0 {
            return Err(ClusterError::Unavailable);
        }
        info!(live, total = self.agents.len(), "cluster running");
        Ok(())
    }

    /// Add `amount` users across the cluster, least-loaded agents
    /// first. The request is clamped so the aggregate never exceeds
    /// the configured cap.
    pub async fn increment_users(&self, amount: usize) -> Result<(), ClusterError> {
        let headroom = self
            .max_active_users
            .saturating_sub(self.status().active_users);
        let amount = amount.min(headroom);
        if amount == 0 {
            debug!("cluster is at the active-user cap, nothing to add");
            return Ok(());
        }
        self.dispatch(amount, Dispatch::Increment).await
    }

    /// Remove `amount` users across the cluster, most-loaded agents
    /// first.
    pub async fn decrement_users(&self, amount: usize) -> Result<(), ClusterError> {
        if amount == 0 {
            return Ok(());
        }
        self.dispatch(amount, Dispatch::Decrement).await
    }

    async fn dispatch(&self, amount: usize, direction: Dispatch) -> Result<(), ClusterError> {
        let mut live = self.live_agents();
        if live.is_empty() {
            return Err(ClusterError::Unavailable);
        }

        // Fill the least-loaded first on increment, drain the
        // most-loaded first on decrement; agent id breaks ties.
        match direction {
            Dispatch::Increment => {
                live.sort_by_key(|a| (a.status().active_users, a.id().to_string()))
            }
            Dispatch::Decrement => {
                live.sort_by_key(|a| (Reverse(a.status().active_users), a.id().to_string()))
            }
        }

        let base = amount / live.len();
        let remainder = amount % live.len();

        let mut ops = Vec::new();
        for (i, agent) in live.iter().enumerate() {
            let mut share = base + usize::from(i < remainder);
            if let Dispatch::Decrement = direction {
                share = share.min(agent.status().active_users);
            }
            if share == 0 {
                continue;
            }
            let is_increment = matches!(direction, Dispatch::Increment);
            ops.push(async move {
                let res = if is_increment {
                    agent.add_users(share).await
                } else {
                    agent.remove_users(share).await
                };
                (agent.id().to_string(), res)
            });
        }

        let mut failed = Vec::new();
        for (id, res) in join_all(ops).await {
            if let Err(e) = res {
                warn!(agent_id = %id, error = %e, "dispatch to agent failed");
                failed.push(id);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::PartialDispatch(failed))
        }
    }

    /// Aggregate status over live agents from their last-known
    /// statuses; never performs network I/O.
    pub fn status(&self) -> ClusterStatus {
        let mut status = ClusterStatus::default();
        for agent in self.live_agents() {
            let s = agent.status();
            status.active_users += s.active_users;
            status.num_errors += s.num_errors;
        }
        status
    }

    /// Destroy every created agent in parallel, best-effort under a
    /// bounded deadline. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let destroys = self
            .agents
            .iter()
            .filter(|a| a.created())
            .map(|agent| async move {
                if let Err(e) = agent.destroy().await {
                    warn!(agent_id = %agent.id(), error = %e, "failed to destroy agent");
                }
            });

        if tokio::time::timeout(SHUTDOWN_DEADLINE, join_all(destroys))
            .await
            .is_err()
        {
            warn!("cluster shutdown deadline exceeded");
        }
        info!("cluster shut down");
    }

    fn live_agents(&self) -> Vec<&Arc<LoadAgent>> {
        self.agents
            .iter()
            .filter(|a| a.status().state != AgentState::Failed)
            .collect()
    }
}
