//! Performance monitor
//!
//! A single background task evaluates the configured queries in
//! declared order on every tick and publishes one `PerfSample` per
//! tick. The first alert-bearing query at or above its threshold
//! short-circuits the tick; a failed query is skipped with a warning.

mod prometheus;

pub use prometheus::PrometheusClient;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, Query};
use crate::error::MonitorError;
use crate::models::PerfSample;

/// Periodic evaluator of the configured metric queries
pub struct Monitor {
    config: MonitorConfig,
    client: PrometheusClient,
    stop_tx: watch::Sender<bool>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let client = PrometheusClient::new(&config.prometheus_url)?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            client,
            stop_tx,
        })
    }

    /// Start the monitoring task and return the sample channel
    ///
    /// The channel holds at most one sample in flight; the task
    /// alternates publication and sleep. After `stop()` no further
    /// sends occur, including from a later `run()`.
    pub fn run(&self) -> mpsc::Receiver<PerfSample> {
        let (tx, rx) = mpsc::channel(1);
        let client = self.client.clone();
        let config = self.config.clone();
        let mut stop = self.stop_tx.subscribe();

        tokio::spawn(async move {
            info!("monitor started");
            let interval = config.update_interval();
            loop {
                if *stop.borrow() {
                    break;
                }
                let sample = run_queries(&client, &config.queries, &stop).await;
                if *stop.borrow() {
                    break;
                }
                if tx.send(sample).await.is_err() {
                    // Receiver gone; the coordinator has moved on.
                    break;
                }
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("monitor stopped");
        });

        rx
    }

    /// Signal the monitoring task to stop; idempotent
    pub fn stop(&self) {
        info!("monitor stopping");
        // send_replace records the stop even when no task is
        // currently subscribed.
        self.stop_tx.send_replace(true);
    }
}

async fn run_queries(
    client: &PrometheusClient,
    queries: &[Query],
    stop: &watch::Receiver<bool>,
) -> PerfSample {
    for query in queries {
        // Stop interrupts between queries, never mid-request.
        if *stop.borrow() {
            debug!("exiting query loop");
            break;
        }

        let value = match client.vector_first(&query.query).await {
            Ok(value) => value,
            Err(e) => {
                warn!(query = %query.description, error = %e, "query failed, skipping");
                continue;
            }
        };

        debug!(
            query = %query.description,
            value,
            threshold = query.threshold,
            "ran query"
        );

        if query.alert && value >= query.threshold {
            warn!(
                query = %query.description,
                value,
                threshold = query.threshold,
                "value is above the threshold"
            );
            return PerfSample {
                alert: true,
                timestamp: Utc::now(),
            };
        }
    }

    PerfSample {
        alert: false,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Query as UrlQuery, State};
    use axum::routing::get;
    use axum::{Json, Router};

    /// Stub backend that alerts for queries containing "hot" and
    /// counts every request it serves.
    struct StubBackend {
        hits: AtomicUsize,
    }

    async fn query_handler(
        State(state): State<Arc<StubBackend>>,
        UrlQuery(params): UrlQuery<std::collections::HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        state.hits.fetch_add(1, Ordering::SeqCst);
        let query = params.get("query").cloned().unwrap_or_default();
        let value = if query.contains("hot") { "9.5" } else { "0.1" };
        if query.contains("empty") {
            return Json(serde_json::json!({
                "status": "success",
                "data": { "resultType": "vector", "result": [] }
            }));
        }
        Json(serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    { "metric": {}, "value": [1700000000.0, value] }
                ]
            }
        }))
    }

    async fn spawn_backend() -> (String, Arc<StubBackend>) {
        let state = Arc::new(StubBackend {
            hits: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/api/v1/query", get(query_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    // A long interval keeps single-tick tests deterministic: the
    // second tick never arrives while the test is asserting.
    fn monitor_config(url: &str, queries: Vec<Query>) -> MonitorConfig {
        MonitorConfig {
            prometheus_url: url.to_string(),
            update_interval_ms: 60_000,
            queries,
        }
    }

    fn query(description: &str, query: &str, threshold: f64, alert: bool) -> Query {
        Query {
            description: description.to_string(),
            query: query.to_string(),
            threshold,
            alert,
        }
    }

    #[tokio::test]
    async fn emits_alert_when_threshold_crossed() {
        let (url, _) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![query("cpu", "hot_cpu", 1.0, true)],
        ))
        .unwrap();

        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(sample.alert);
        monitor.stop();
    }

    #[tokio::test]
    async fn emits_ok_when_below_threshold() {
        let (url, _) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![query("cpu", "cool_cpu", 1.0, true)],
        ))
        .unwrap();

        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(!sample.alert);
        monitor.stop();
    }

    #[tokio::test]
    async fn first_alerting_query_short_circuits_the_tick() {
        let (url, state) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![
                query("first", "hot_first", 1.0, true),
                query("second", "hot_second", 1.0, true),
            ],
        ))
        .unwrap();

        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(sample.alert);
        // Only the first query was evaluated on the alerting tick.
        assert_eq!(state.hits.load(Ordering::SeqCst), 1);
        monitor.stop();
    }

    #[tokio::test]
    async fn non_alert_query_never_fires() {
        let (url, _) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![
                query("observed", "hot_observed", 1.0, false),
                query("guard", "cool_guard", 1.0, true),
            ],
        ))
        .unwrap();

        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(!sample.alert);
        monitor.stop();
    }

    #[tokio::test]
    async fn failed_query_is_skipped_not_fatal() {
        let (url, _) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![
                query("missing", "empty_series", 1.0, true),
                query("cpu", "hot_cpu", 1.0, true),
            ],
        ))
        .unwrap();

        // The empty query is skipped; the second one still alerts.
        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(sample.alert);
        monitor.stop();
    }

    #[tokio::test]
    async fn unreachable_backend_yields_ok_samples() {
        let monitor = Monitor::new(monitor_config(
            "http://127.0.0.1:1",
            vec![query("cpu", "hot_cpu", 1.0, true)],
        ))
        .unwrap();

        let mut rx = monitor.run();
        let sample = rx.recv().await.unwrap();
        assert!(!sample.alert);
        monitor.stop();
    }

    #[tokio::test]
    async fn stopped_monitor_produces_no_more_samples() {
        let (url, _) = spawn_backend().await;
        let monitor = Monitor::new(monitor_config(
            &url,
            vec![query("cpu", "cool_cpu", 1.0, true)],
        ))
        .unwrap();

        let mut rx = monitor.run();
        assert!(rx.recv().await.is_some());
        monitor.stop();

        // Drain anything already in flight, then expect the channel
        // to close without new samples.
        tokio::time::sleep(Duration::from_millis(250)).await;
        while let Ok(sample) = rx.try_recv() {
            drop(sample);
        }
        assert!(rx.try_recv().is_err());

        // A fresh run on a stopped monitor yields nothing.
        let mut rx2 = monitor.run();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx2.try_recv().is_err());
    }
}
