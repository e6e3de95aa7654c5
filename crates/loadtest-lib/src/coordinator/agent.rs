//! HTTP client bound to one remote load agent
//!
//! Every operation is a single round-trip to the agent's
//! `/loadagent` API. The last-known status is updated atomically on
//! each successful call, so `status()` never performs network I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::models::{AgentStatus, ApiResponse, CreateRequest};

/// Timeout applied to every outbound request
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a single remote load agent
pub struct LoadAgent {
    config: AgentConfig,
    base_url: String,
    client: reqwest::Client,
    status: RwLock<AgentStatus>,
    created: AtomicBool,
}

impl LoadAgent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = config.api_url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            base_url,
            client,
            status: RwLock::new(AgentStatus::default()),
            created: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Whether a `create` call has succeeded; such agents are owed a
    /// matching `destroy` on teardown.
    pub fn created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    /// Last-known status; no network I/O
    pub fn status(&self) -> AgentStatus {
        self.status.read().unwrap().clone()
    }

    /// Mark the agent dead locally, excluding it from dispatch
    pub(crate) fn mark_failed(&self) {
        self.status.write().unwrap().state = crate::models::AgentState::Failed;
    }

    /// Create the remote agent from the configured load-test settings
    ///
    /// The initial user count is forced to zero: the coordinator, not
    /// the configuration, drives user counts.
    pub async fn create(&self) -> Result<(), AgentError> {
        let mut load_test = self.config.load_test.clone();
        load_test.users.initial_active_users = 0;
        let body = CreateRequest {
            load_test_config: load_test,
            controller_config: self.config.controller.clone(),
        };

        let url = format!("{}/loadagent/create?id={}", self.base_url, self.config.id);
        self.api_request(self.client.post(url).json(&body)).await?;
        self.created.store(true, Ordering::SeqCst);
        info!(agent_id = %self.config.id, "agent created");
        Ok(())
    }

    /// Start the remote agent's simulated users
    pub async fn run(&self) -> Result<(), AgentError> {
        let url = format!("{}/loadagent/{}/run", self.base_url, self.config.id);
        self.api_request(self.client.post(url)).await
    }

    /// Destroy the remote agent
    pub async fn destroy(&self) -> Result<(), AgentError> {
        let url = format!("{}/loadagent/{}", self.base_url, self.config.id);
        self.api_request(self.client.delete(url)).await?;
        info!(agent_id = %self.config.id, "agent destroyed");
        Ok(())
    }

    pub async fn add_users(&self, amount: usize) -> Result<(), AgentError> {
        if amount == 0 {
            return Err(AgentError::InvalidAmount);
        }
        let url = format!(
            "{}/loadagent/{}/addusers?amount={}",
            self.base_url, self.config.id, amount
        );
        self.api_request(self.client.post(url)).await
    }

    pub async fn remove_users(&self, amount: usize) -> Result<(), AgentError> {
        if amount == 0 {
            return Err(AgentError::InvalidAmount);
        }
        let url = format!(
            "{}/loadagent/{}/removeusers?amount={}",
            self.base_url, self.config.id, amount
        );
        self.api_request(self.client.post(url)).await
    }

    /// Fetch the remote status, updating the local copy
    pub async fn fetch_status(&self) -> Result<AgentStatus, AgentError> {
        let url = format!("{}/loadagent/{}", self.base_url, self.config.id);
        self.api_request(self.client.get(url)).await?;
        Ok(self.status())
    }

    async fn api_request(&self, req: reqwest::RequestBuilder) -> Result<(), AgentError> {
        let resp = req.send().await?;
        let code = resp.status();
        if code != StatusCode::OK && code != StatusCode::CREATED {
            if code == StatusCode::NOT_FOUND {
                return Err(AgentError::NotFound);
            }
            return Err(AgentError::BadStatus(code.as_u16()));
        }

        let body: ApiResponse = resp.json().await?;
        if let Some(err) = body.error.filter(|e| !e.is_empty()) {
            return Err(AgentError::Api(err));
        }
        if let Some(status) = body.status {
            *self.status.write().unwrap() = status;
        }
        Ok(())
    }
}
