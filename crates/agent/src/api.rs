//! HTTP API exposing the local load-test engine
//!
//! The `/loadagent` routes preserve the wire contract the coordinator
//! consumes: a uniform `ApiResponse` envelope, 404 for unknown agent
//! ids, and engine-level refusals reported through the envelope's
//! `error` field. Health and Prometheus endpoints ride along.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use loadtest_lib::engine::LoadTester;
use loadtest_lib::models::{ApiResponse, CreateRequest};
use loadtest_lib::observability::LoadTestMetrics;

/// Shared application state
pub struct AppState {
    agents: RwLock<HashMap<String, LoadTester>>,
    metrics: LoadTestMetrics,
    ready: AtomicBool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            metrics: LoadTestMetrics::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    async fn total_active_users(&self) -> usize {
        let agents = self.agents.read().await;
        agents.values().map(|t| t.status().active_users).sum()
    }

    async fn update_user_gauge(&self) {
        let total = self.total_active_users().await;
        self.metrics.set_agent_active_users(total);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct CreateParams {
    id: String,
}

#[derive(Deserialize)]
struct AmountParams {
    amount: usize,
}

fn not_found(id: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("agent {id} not found"))),
    )
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateParams>,
    Json(body): Json<CreateRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if params.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("agent id must not be empty")),
        );
    }

    if let Err(e) = body
        .load_test_config
        .validate()
        .and_then(|()| body.controller_config.validate())
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(e.to_string())),
        );
    }

    let mut agents = state.agents.write().await;
    if agents.contains_key(&params.id) {
        return (
            StatusCode::OK,
            Json(ApiResponse::error(format!(
                "agent {} already exists",
                params.id
            ))),
        );
    }

    let tester = LoadTester::new(
        params.id.clone(),
        body.load_test_config,
        body.controller_config,
    );
    let status = tester.status();
    agents.insert(params.id.clone(), tester);
    info!(agent_id = %params.id, "load-test agent created");

    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(status, "load-test agent created")),
    )
}

async fn run_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let mut agents = state.agents.write().await;
    let Some(tester) = agents.get_mut(&id) else {
        return not_found(&id);
    };

    match tester.run() {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(tester.status(), "agent running")),
        ),
        Err(e) => (StatusCode::OK, Json(ApiResponse::error(e.to_string()))),
    }
}

async fn destroy_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let mut agents = state.agents.write().await;
    let Some(mut tester) = agents.remove(&id) else {
        return not_found(&id);
    };
    tester.stop();
    let status = tester.status();
    drop(agents);

    state.update_user_gauge().await;
    info!(agent_id = %id, "load-test agent destroyed");
    (
        StatusCode::OK,
        Json(ApiResponse::ok(status, "agent destroyed")),
    )
}

async fn add_users(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<AmountParams>,
) -> (StatusCode, Json<ApiResponse>) {
    if params.amount == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("amount must be greater than zero")),
        );
    }

    let mut agents = state.agents.write().await;
    let Some(tester) = agents.get_mut(&id) else {
        return not_found(&id);
    };

    let resp = match tester.add_users(params.amount) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(tester.status(), "users added")),
        ),
        Err(e) => (StatusCode::OK, Json(ApiResponse::error(e.to_string()))),
    };
    drop(agents);

    state.update_user_gauge().await;
    resp
}

async fn remove_users(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<AmountParams>,
) -> (StatusCode, Json<ApiResponse>) {
    if params.amount == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("amount must be greater than zero")),
        );
    }

    let mut agents = state.agents.write().await;
    let Some(tester) = agents.get_mut(&id) else {
        return not_found(&id);
    };

    let resp = match tester.remove_users(params.amount) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(tester.status(), "users removed")),
        ),
        Err(e) => (StatusCode::OK, Json(ApiResponse::error(e.to_string()))),
    };
    drop(agents);

    state.update_user_gauge().await;
    resp
}

async fn agent_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let agents = state.agents.read().await;
    let Some(tester) = agents.get(&id) else {
        return not_found(&id);
    };
    (
        StatusCode::OK,
        Json(ApiResponse::ok(tester.status(), "agent status")),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    agents: usize,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let agents = state.agents.read().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            agents: agents.len(),
        }),
    )
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.ready.load(Ordering::SeqCst);
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(ReadinessResponse { ready }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/loadagent/create", post(create_agent))
        .route("/loadagent/{id}/run", post(run_agent))
        .route("/loadagent/{id}", delete(destroy_agent).get(agent_status))
        .route("/loadagent/{id}/addusers", post(add_users))
        .route("/loadagent/{id}/removeusers", post(remove_users))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting agent API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
